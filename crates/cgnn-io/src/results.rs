//! Test-time prediction table and scatter plot.
use crate::error::{DataError, Result};
use cgnn_core::target_name;
use polars::prelude::*;
use std::path::Path;
use svg::node::element::{Circle, Line, Rectangle, Text};
use svg::Document;
use tracing::info;

/// One row of the prediction table.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub structure: String,
    pub truth: f64,
    pub pred: f64,
    pub target: String,
}

impl Prediction {
    /// Derives `target` from the structure name.
    pub fn new(structure: impl Into<String>, truth: f64, pred: f64) -> Self {
        let structure = structure.into();
        let target = target_name(&structure).to_string();
        Self {
            structure,
            truth,
            pred,
            target,
        }
    }
}

/// Writes the CSV with columns `structure,true,pred,target`.
pub fn write_predictions(path: impl AsRef<Path>, predictions: &[Prediction]) -> Result<()> {
    let path = path.as_ref();
    let mut df = df!(
        "structure" => predictions.iter().map(|p| p.structure.as_str()).collect::<Vec<_>>(),
        "true" => predictions.iter().map(|p| p.truth).collect::<Vec<_>>(),
        "pred" => predictions.iter().map(|p| p.pred).collect::<Vec<_>>(),
        "target" => predictions.iter().map(|p| p.target.as_str()).collect::<Vec<_>>(),
    )?;
    let mut file = std::fs::File::create(path).map_err(|e| DataError::io(path, e))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    info!("wrote {} predictions to {}", predictions.len(), path.display());
    Ok(())
}

const PLOT_SIZE: f64 = 480.0;
const PLOT_MARGIN: f64 = 56.0;

/// Writes an SVG scatter plot of true against predicted values with the
/// identity line for reference.
pub fn write_scatter_plot(path: impl AsRef<Path>, predictions: &[Prediction], title: &str) -> Result<()> {
    let path = path.as_ref();
    let (lo, hi) = predictions
        .iter()
        .flat_map(|p| [p.truth, p.pred])
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (lo, hi) = if lo > hi {
        (0.0, 1.0)
    } else if hi - lo < 1e-9 {
        (lo - 0.5, hi + 0.5)
    } else {
        let pad = 0.05 * (hi - lo);
        (lo - pad, hi + pad)
    };
    let inner = PLOT_SIZE - 2.0 * PLOT_MARGIN;
    let sx = |v: f64| PLOT_MARGIN + (v - lo) / (hi - lo) * inner;
    let sy = |v: f64| PLOT_SIZE - PLOT_MARGIN - (v - lo) / (hi - lo) * inner;

    let mut document = Document::new()
        .set("width", PLOT_SIZE)
        .set("height", PLOT_SIZE)
        .set("viewBox", format!("0 0 {PLOT_SIZE} {PLOT_SIZE}"))
        .add(
            Rectangle::new()
                .set("width", "100%")
                .set("height", "100%")
                .set("fill", "white"),
        )
        .add(
            Rectangle::new()
                .set("x", PLOT_MARGIN)
                .set("y", PLOT_MARGIN)
                .set("width", inner)
                .set("height", inner)
                .set("fill", "none")
                .set("stroke", "black"),
        )
        .add(
            Line::new()
                .set("x1", sx(lo))
                .set("y1", sy(lo))
                .set("x2", sx(hi))
                .set("y2", sy(hi))
                .set("stroke", "gray")
                .set("stroke-dasharray", "4 4"),
        )
        .add(axis_label(PLOT_SIZE / 2.0, PLOT_SIZE - 16.0, "true", 0.0))
        .add(axis_label(18.0, PLOT_SIZE / 2.0, "pred", -90.0))
        .add(axis_label(PLOT_SIZE / 2.0, 30.0, title, 0.0))
        .add(axis_label(PLOT_MARGIN, PLOT_SIZE - PLOT_MARGIN + 16.0, &format!("{lo:.2}"), 0.0))
        .add(axis_label(
            PLOT_SIZE - PLOT_MARGIN,
            PLOT_SIZE - PLOT_MARGIN + 16.0,
            &format!("{hi:.2}"),
            0.0,
        ));

    for p in predictions.iter().filter(|p| p.truth.is_finite() && p.pred.is_finite()) {
        document = document.add(
            Circle::new()
                .set("cx", sx(p.truth))
                .set("cy", sy(p.pred))
                .set("r", 3)
                .set("fill", "steelblue")
                .set("fill-opacity", 0.6),
        );
    }
    svg::save(path, &document).map_err(|e| DataError::io(path, e))?;
    info!("wrote scatter plot to {}", path.display());
    Ok(())
}

fn axis_label(x: f64, y: f64, content: &str, rotate: f64) -> Text {
    Text::new(content)
        .set("x", x)
        .set("y", y)
        .set("text-anchor", "middle")
        .set("font-family", "sans-serif")
        .set("font-size", 12)
        .set("transform", format!("rotate({rotate} {x} {y})"))
}
