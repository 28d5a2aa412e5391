use crate::cost::short_name;
use crate::cost::CostEntry;
use crate::cost::PriceVariation;
use crate::cost::Simulation;
use crate::error::Error;
use crate::error::Result;
use charts_rs::HorizontalBarChart;
use charts_rs::LineChart;
use charts_rs::Series;
use chrono::TimeZone;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

// Keeps multi-day simulations renderable.
const MAX_LINE_POINTS: usize = 500;
const X_LABEL_EVERY: usize = 50;

pub fn bar_chart(title: &str, data: &[(String, f64)]) -> Result<String> {
  let labels: Vec<String> = data.iter().map(|(label, _)| label.clone()).collect();
  let values: Vec<f32> = data.iter().map(|(_, val)| *val as f32).collect();

  let series = Series::new("".to_string(), values);
  let mut chart = HorizontalBarChart::new_with_theme(vec![series], labels, "light");
  chart.title_text = title.to_string();
  chart.width = 1200.0;
  chart.height = 80.0 + data.len() as f32 * 35.0;
  chart.legend_show = Some(false);
  chart.svg().map_err(|err| Error::Chart(err.to_string()))
}

pub fn line_chart(title: &str, x_axis: Vec<String>, series: Vec<(String, Vec<f64>)>) -> Result<String> {
  let series_list = series
    .into_iter()
    .map(|(label, values)| Series::new(label, values.into_iter().map(|v| v as f32).collect()))
    .collect();
  let mut chart = LineChart::new_with_theme(series_list, x_axis, "light");
  chart.title_text = title.to_string();
  chart.width = 1200.0;
  chart.height = 800.0;
  chart.svg().map_err(|err| Error::Chart(err.to_string()))
}

fn time_label(timestamp: i64) -> String {
  match Utc.timestamp_opt(timestamp, 0).single() {
    Some(t) => t.format("%m-%d %H:%M").to_string(),
    None => timestamp.to_string(),
  }
}

/// Per-minute (or running total) cost of both deployments over the simulated span.
pub fn simulation_chart(sim: &Simulation, cumulative: bool) -> Result<String> {
  let mut reference = Vec::with_capacity(sim.ticks.len());
  let mut alternative = Vec::with_capacity(sim.ticks.len());
  let (mut reference_sum, mut alternative_sum) = (0.0, 0.0);
  for tick in &sim.ticks {
    reference_sum += tick.reference_cost;
    alternative_sum += tick.alternative_cost;
    if cumulative {
      reference.push(reference_sum);
      alternative.push(alternative_sum);
    } else {
      reference.push(tick.reference_cost);
      alternative.push(tick.alternative_cost);
    };
  }

  let stride = ((sim.ticks.len() + MAX_LINE_POINTS - 1) / MAX_LINE_POINTS).max(1);
  let sample = |values: Vec<f64>| values.into_iter().step_by(stride).collect::<Vec<_>>();
  let x_axis = sim
    .ticks
    .iter()
    .step_by(stride)
    .enumerate()
    .map(|(i, tick)| {
      if i % X_LABEL_EVERY == 0 {
        time_label(tick.timestamp)
      } else {
        String::new()
      }
    })
    .collect();

  let title = if cumulative {
    "Cumulative cost ($)"
  } else {
    "Cost per minute ($)"
  };
  line_chart(title, x_axis, vec![
    ("reference costs".to_string(), sample(reference)),
    ("cheapest alternative costs".to_string(), sample(alternative)),
  ])
}

pub fn price_per_mnps_chart(entries: &[CostEntry]) -> Result<String> {
  let data: Vec<(String, f64)> = entries
    .iter()
    .map(|e| (short_name(&e.instance_type, &e.region), e.cost_per_mnps))
    .collect();
  bar_chart("Price per MNPS ($/h)", &data)
}

pub fn price_variation_chart(variations: &[PriceVariation]) -> Result<String> {
  let data: Vec<(String, f64)> = variations.iter().map(|v| (v.label(), v.ratio())).collect();
  bar_chart("Cheapest / most expensive region price", &data)
}

pub fn write_svg(dir: &Path, filename: &str, svg: &str) -> Result<PathBuf> {
  fs::create_dir_all(dir).map_err(|source| Error::Io {
    path: dir.to_path_buf(),
    source,
  })?;
  let path = dir.join(filename);
  fs::write(&path, svg).map_err(|source| Error::Io {
    path: path.clone(),
    source,
  })?;
  Ok(path)
}
