//! Chart renderer: owns one in-memory canvas and at most one mounted
//! visualization at a time. Every render entry point destroys the prior
//! chart, draws the new one, and mounts a fresh handle.

use std::collections::HashMap;

use image::codecs::png::PngEncoder;
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::debug;

use crate::aggregate::{MonthKey, MonthlyBucket};
use crate::palette::color_sets;
use crate::VisitError;

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 760;

const BG_COLOR: RGBColor = RGBColor(255, 255, 255);

/// Fixed display colors for the five monthly series
/// (total, new, returning, desktop, mobile).
const TOTAL_COLOR: RGBColor = RGBColor(54, 162, 235);
const NEW_COLOR: RGBColor = RGBColor(75, 192, 192);
const RETURNING_COLOR: RGBColor = RGBColor(153, 102, 255);
const DESKTOP_COLOR: RGBColor = RGBColor(255, 159, 64);
const MOBILE_COLOR: RGBColor = RGBColor(255, 99, 132);

const CUMULATIVE_COLOR: RGBColor = RGBColor(54, 162, 235);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartKind {
    MonthlyBars,
    VisitsOverTime,
    LocationPie,
}

/// Handle for the currently mounted visualization. The generation counter
/// distinguishes a fresh mount from a stale handle after a re-render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveChart {
    pub kind: ChartKind,
    pub generation: u64,
}

/// Fixed-size RGB canvas plus the single active-chart slot.
pub struct ChartSurface {
    width: u32,
    height: u32,
    buf: Vec<u8>,
    active: Option<ActiveChart>,
    generation: u64,
}

impl ChartSurface {
    pub fn new(width: u32, height: u32) -> Result<Self, VisitError> {
        if width == 0 || height == 0 {
            return Err(VisitError::EmptySurface { width, height });
        }
        Ok(Self {
            width,
            height,
            buf: vec![255u8; (width * height * 3) as usize],
            active: None,
            generation: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn active(&self) -> Option<ActiveChart> {
        self.active
    }

    /// Tear down the mounted chart and blank the canvas. Safe no-op when
    /// nothing is mounted.
    pub fn destroy_active(&mut self) {
        if let Some(chart) = self.active.take() {
            debug!("destroying chart {:?} (generation {})", chart.kind, chart.generation);
            self.buf.fill(255);
        }
    }

    /// Grouped bar chart of the per-month breakdown: five aligned series per
    /// month label, in chronological order.
    pub fn render_monthly_bars(
        &mut self,
        buckets: &[(MonthKey, MonthlyBucket)],
    ) -> Result<ActiveChart, VisitError> {
        self.destroy_active();
        let (width, height) = (self.width, self.height);
        {
            let root =
                BitMapBackend::with_buffer(&mut self.buf, (width, height)).into_drawing_area();
            draw_monthly_bars(&root, buckets).map_err(VisitError::Render)?;
        }
        Ok(self.mount(ChartKind::MonthlyBars))
    }

    /// Filled line chart of the cumulative visit series.
    pub fn render_visits_over_time(
        &mut self,
        series: &[(MonthKey, u64)],
    ) -> Result<ActiveChart, VisitError> {
        self.destroy_active();
        let (width, height) = (self.width, self.height);
        {
            let root =
                BitMapBackend::with_buffer(&mut self.buf, (width, height)).into_drawing_area();
            draw_visits_over_time(&root, series).map_err(VisitError::Render)?;
        }
        Ok(self.mount(ChartKind::VisitsOverTime))
    }

    /// Pie chart of per-location totals, slices in descending count order,
    /// colors from the hue-stepping palette.
    pub fn render_location_pie(
        &mut self,
        counts: &HashMap<String, u64>,
    ) -> Result<ActiveChart, VisitError> {
        self.destroy_active();
        let (width, height) = (self.width, self.height);
        {
            let root =
                BitMapBackend::with_buffer(&mut self.buf, (width, height)).into_drawing_area();
            draw_location_pie(&root, counts).map_err(VisitError::Render)?;
        }
        Ok(self.mount(ChartKind::LocationPie))
    }

    /// Encode the canvas as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>, VisitError> {
        let mut png = Vec::new();
        let encoder = PngEncoder::new(&mut png);
        encoder
            .write_image(&self.buf, self.width, self.height, image::ExtendedColorType::Rgb8)
            .map_err(|e| VisitError::ImageEncode(e.to_string()))?;
        Ok(png)
    }

    fn mount(&mut self, kind: ChartKind) -> ActiveChart {
        self.generation += 1;
        let handle = ActiveChart {
            kind,
            generation: self.generation,
        };
        self.active = Some(handle);
        handle
    }
}

fn draw_monthly_bars<DB>(
    root: &DrawingArea<DB, Shift>,
    buckets: &[(MonthKey, MonthlyBucket)],
) -> Result<(), String>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&BG_COLOR).map_err(|e| format!("fill: {}", e))?;
    if buckets.is_empty() {
        return Ok(());
    }

    let n = buckets.len();
    let y_max = buckets
        .iter()
        .map(|(_, b)| b.visitors)
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .build_cartesian_2d(0.0..n as f64, 0.0..y_max * 1.1)
        .map_err(|e| format!("chart build: {}", e))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .y_labels(0)
        .draw()
        .map_err(|e| format!("mesh: {}", e))?;

    // One bar group per month; series slots left to right.
    let series: [(RGBColor, fn(&MonthlyBucket) -> u64); 5] = [
        (TOTAL_COLOR, |b: &MonthlyBucket| b.visitors),
        (NEW_COLOR, |b: &MonthlyBucket| b.new_visitors),
        (RETURNING_COLOR, |b: &MonthlyBucket| b.returning),
        (DESKTOP_COLOR, |b: &MonthlyBucket| b.desktop),
        (MOBILE_COLOR, |b: &MonthlyBucket| b.mobile),
    ];
    let slot = 1.0 / (series.len() as f64 + 1.0);

    for (s, (color, value_of)) in series.iter().enumerate() {
        let fills: Vec<Rectangle<(f64, f64)>> = buckets
            .iter()
            .enumerate()
            .map(|(i, (_, bucket))| {
                let x0 = i as f64 + slot * (s as f64 + 0.5);
                let x1 = x0 + slot * 0.9;
                Rectangle::new([(x0, 0.0), (x1, value_of(bucket) as f64)], color.mix(0.5).filled())
            })
            .collect();
        chart
            .draw_series(fills)
            .map_err(|e| format!("draw bars: {}", e))?;

        let borders: Vec<Rectangle<(f64, f64)>> = buckets
            .iter()
            .enumerate()
            .map(|(i, (_, bucket))| {
                let x0 = i as f64 + slot * (s as f64 + 0.5);
                let x1 = x0 + slot * 0.9;
                Rectangle::new([(x0, 0.0), (x1, value_of(bucket) as f64)], color.stroke_width(1))
            })
            .collect();
        chart
            .draw_series(borders)
            .map_err(|e| format!("draw bar borders: {}", e))?;
    }

    root.present().map_err(|e| format!("present: {}", e))?;
    Ok(())
}

fn draw_visits_over_time<DB>(
    root: &DrawingArea<DB, Shift>,
    series: &[(MonthKey, u64)],
) -> Result<(), String>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&BG_COLOR).map_err(|e| format!("fill: {}", e))?;
    if series.is_empty() {
        return Ok(());
    }

    let n = series.len();
    let y_max = series.last().map(|(_, v)| *v).unwrap_or(0).max(1) as f64;

    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .build_cartesian_2d(0.0..n as f64, 0.0..y_max * 1.1)
        .map_err(|e| format!("chart build: {}", e))?;

    chart
        .configure_mesh()
        .x_labels(0)
        .y_labels(0)
        .draw()
        .map_err(|e| format!("mesh: {}", e))?;

    let points: Vec<(f64, f64)> = series
        .iter()
        .enumerate()
        .map(|(i, (_, total))| (i as f64 + 0.5, *total as f64))
        .collect();

    chart
        .draw_series(AreaSeries::new(
            points.iter().copied(),
            0.0,
            CUMULATIVE_COLOR.mix(0.35).filled(),
        ))
        .map_err(|e| format!("draw area: {}", e))?;
    chart
        .draw_series(LineSeries::new(
            points.into_iter(),
            CUMULATIVE_COLOR.stroke_width(2),
        ))
        .map_err(|e| format!("draw line: {}", e))?;

    root.present().map_err(|e| format!("present: {}", e))?;
    Ok(())
}

fn draw_location_pie<DB>(
    root: &DrawingArea<DB, Shift>,
    counts: &HashMap<String, u64>,
) -> Result<(), String>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&BG_COLOR).map_err(|e| format!("fill: {}", e))?;

    let mut slices: Vec<(&str, u64)> = counts
        .iter()
        .map(|(label, count)| (label.as_str(), *count))
        .collect();
    // Descending by count; ties broken by label for a stable layout.
    slices.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let total: u64 = slices.iter().map(|(_, c)| c).sum();
    if total == 0 {
        return Ok(());
    }

    let (w, h) = root.dim_in_pixel();
    let cx = w as f64 / 2.0;
    let cy = h as f64 / 2.0;
    let radius = (w.min(h) as f64 / 2.0) * 0.8;

    let colors = color_sets(slices.len());
    // Start at 12 o'clock, sweep clockwise.
    let mut start = -std::f64::consts::FRAC_PI_2;
    for (idx, (_, count)) in slices.iter().enumerate() {
        let sweep = std::f64::consts::TAU * *count as f64 / total as f64;
        let steps = ((sweep / 0.02).ceil() as usize).max(2);

        let mut points = Vec::with_capacity(steps + 2);
        points.push((cx as i32, cy as i32));
        for step in 0..=steps {
            let angle = start + sweep * step as f64 / steps as f64;
            points.push((
                (cx + radius * angle.cos()).round() as i32,
                (cy + radius * angle.sin()).round() as i32,
            ));
        }

        root.draw(&Polygon::new(points.clone(), colors.background[idx].filled()))
            .map_err(|e| format!("draw slice: {}", e))?;

        let mut outline = points;
        outline.push((cx as i32, cy as i32));
        root.draw(&PathElement::new(outline, colors.border[idx].stroke_width(2)))
            .map_err(|e| format!("draw slice border: {}", e))?;

        start += sweep;
    }

    root.present().map_err(|e| format!("present: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{counts_by_month, location_counts, visits_over_time};
    use crate::{DeviceType, VisitRecord, VisitorKind};
    use chrono::NaiveDate;

    fn sample_records() -> Vec<VisitRecord> {
        let mut records = Vec::new();
        for (y, m, d, device, kind, loc) in [
            (2024, 1, 5, DeviceType::Desktop, VisitorKind::New, "ON"),
            (2024, 1, 20, DeviceType::Mobile, VisitorKind::Returning, "ON"),
            (2024, 2, 1, DeviceType::Desktop, VisitorKind::New, "BC"),
            (2024, 3, 9, DeviceType::Mobile, VisitorKind::New, "QC"),
        ] {
            records.push(VisitRecord {
                visit_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
                device,
                kind,
                location: loc.to_string(),
            });
        }
        records
    }

    fn blank(surface: &ChartSurface) -> bool {
        surface.buf.iter().all(|&b| b == 255)
    }

    #[test]
    fn test_zero_area_surface_rejected() {
        assert!(matches!(
            ChartSurface::new(0, 100),
            Err(VisitError::EmptySurface { width: 0, height: 100 })
        ));
        assert!(matches!(
            ChartSurface::new(100, 0),
            Err(VisitError::EmptySurface { .. })
        ));
    }

    #[test]
    fn test_render_mounts_one_chart_at_a_time() {
        let records = sample_records();
        let mut surface = ChartSurface::new(320, 200).unwrap();
        assert!(surface.active().is_none());

        let first = surface.render_monthly_bars(&counts_by_month(&records)).unwrap();
        assert_eq!(first.kind, ChartKind::MonthlyBars);
        assert_eq!(first.generation, 1);
        assert!(!blank(&surface));

        let second = surface
            .render_visits_over_time(&visits_over_time(&records))
            .unwrap();
        assert_eq!(second.kind, ChartKind::VisitsOverTime);
        assert_eq!(second.generation, 2);
        assert_eq!(surface.active(), Some(second));
        assert_ne!(first, second);
    }

    #[test]
    fn test_destroy_is_idempotent_and_render_recovers() {
        let records = sample_records();
        let mut surface = ChartSurface::new(320, 200).unwrap();
        surface
            .render_location_pie(&location_counts(&records))
            .unwrap();
        assert!(surface.active().is_some());

        surface.destroy_active();
        assert!(surface.active().is_none());
        assert!(blank(&surface));
        // Second destroy with nothing mounted: no-op, no panic.
        surface.destroy_active();
        assert!(surface.active().is_none());

        let handle = surface.render_monthly_bars(&counts_by_month(&records)).unwrap();
        assert_eq!(handle.generation, 2);
        assert!(!blank(&surface));
    }

    #[test]
    fn test_empty_aggregates_mount_blank_charts() {
        let mut surface = ChartSurface::new(160, 120).unwrap();

        let handle = surface.render_monthly_bars(&[]).unwrap();
        assert_eq!(handle.kind, ChartKind::MonthlyBars);

        surface.render_visits_over_time(&[]).unwrap();
        let counts = HashMap::new();
        let handle = surface.render_location_pie(&counts).unwrap();
        assert_eq!(handle.kind, ChartKind::LocationPie);
        assert_eq!(handle.generation, 3);
    }

    #[test]
    fn test_pie_draws_all_slices() {
        let records = sample_records();
        let mut surface = ChartSurface::new(240, 240).unwrap();
        surface
            .render_location_pie(&location_counts(&records))
            .unwrap();
        assert!(!blank(&surface));
    }

    #[test]
    fn test_to_png_produces_png_bytes() {
        let records = sample_records();
        let mut surface = ChartSurface::new(160, 120).unwrap();
        surface
            .render_visits_over_time(&visits_over_time(&records))
            .unwrap();
        let png = surface.to_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
