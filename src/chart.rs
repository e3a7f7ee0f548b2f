#![cfg(feature = "web")]
use plotters::prelude::*;
use tempfile::Builder;

use crate::aggregate::Bar;

/// Configuration options for bar chart generation
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Label for the X-axis (the categories)
    pub x_label: String,

    /// Label for the Y-axis (the values)
    pub y_label: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,

    /// Fixed top of the value axis, `None` to fit the data
    pub y_max: Option<f64>,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Chart".to_string(),
            x_label: String::new(),
            y_label: String::new(),
            width: 640,
            height: 400,
            y_max: None,
        }
    }
}

impl ChartOptions {
    /// Total practice minutes per member.
    pub fn member_minutes() -> Self {
        Self {
            title: "Total practice time".to_string(),
            x_label: "Member".to_string(),
            y_label: "Minutes".to_string(),
            ..Self::default()
        }
    }

    /// Average latest completion per song.
    pub fn song_progress() -> Self {
        Self {
            title: "Song progress (latest)".to_string(),
            x_label: "Song".to_string(),
            y_label: "Completion (%)".to_string(),
            y_max: Some(100.0),
            ..Self::default()
        }
    }
}

/// Render labelled bars to PNG bytes
///
/// The bitmap backend writes to a file, so the chart is drawn into a
/// temporary file and read back.
///
/// # Arguments
/// * `bars` - One bar per category, drawn left to right in the given order
/// * `options` - Title, axis labels, size and optional fixed value range
///
/// # Returns
/// The encoded PNG image
///
/// # Errors
/// * Returns an error if there is nothing to draw
/// * Returns an error if drawing or reading the temporary file fails
pub fn bar_chart_png(bars: &[Bar], options: &ChartOptions) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    if bars.is_empty() {
        return Err("no data to chart".into());
    }

    let temp = Builder::new().prefix("band-chart-").suffix(".png").tempfile()?;
    {
        let root = BitMapBackend::new(temp.path(), (options.width, options.height)).into_drawing_area();
        root.fill(&WHITE)?;

        let data_max = bars.iter().map(|b| b.value).fold(0.0_f64, f64::max);
        let y_max = options.y_max.unwrap_or(data_max * 1.1).max(data_max).max(1.0);

        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((0..bars.len()).into_segmented(), 0.0..y_max)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_labels(bars.len())
            .x_label_formatter(&|segment| match segment {
                SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => {
                    bars.get(*i).map(|b| b.label.clone()).unwrap_or_default()
                }
                SegmentValue::Last => String::new(),
            })
            .draw()?;

        chart.draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.7).filled())
                .margin(12)
                .data(bars.iter().enumerate().map(|(i, b)| (i, b.value))),
        )?;

        root.present()?;
    }

    // Read the file directly, the temp file is removed on drop
    let png_data = std::fs::read(temp.path())?;

    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chart_is_an_error() {
        assert!(bar_chart_png(&[], &ChartOptions::member_minutes()).is_err());
    }

    #[test]
    fn song_chart_is_pinned_to_percent() {
        let options = ChartOptions::song_progress();
        assert_eq!(options.y_max, Some(100.0));
        assert_eq!(options.y_label, "Completion (%)");
    }
}
