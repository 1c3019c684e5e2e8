//! Exporters for analysis results.
//!
//! Every result type serialises to JSON. Tabular results also export as CSV
//! and anything that lays shots out in time exports as a CMX3600-style edit
//! decision list. Numbers are always written in plain decimal notation.

use std::{fmt, io, path::Path, str::FromStr};

use serde::Serialize;

use crate::{
    error::ExportError,
    engine::SequenceReport,
    matching::ColorLut,
    sequence::{PacingPlan, PairAnalysis, TransitionType},
    timeline::Timeline,
};

/// Frame rate of EDL timecodes.
pub const EDL_FPS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Json,
    Csv,
    Edl,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Edl => "edl",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "edl" => Ok(Self::Edl),
            other => Err(ExportError::UnsupportedFormat(other.to_owned())),
        }
    }
}

/// A result that can be written out by [`export`].
pub trait Exportable: Serialize {
    /// Name used in error messages.
    const ARTIFACT: &'static str;

    fn to_csv(&self) -> Result<String, ExportError> {
        Err(unsupported(ExportFormat::Csv, Self::ARTIFACT))
    }

    fn to_edl(&self, _title: &str) -> Result<String, ExportError> {
        Err(unsupported(ExportFormat::Edl, Self::ARTIFACT))
    }
}

fn unsupported(format: ExportFormat, artifact: &'static str) -> ExportError {
    ExportError::UnsupportedArtifact {
        format: format.as_str(),
        artifact,
    }
}

/// JSON formatter that prints floats with `Display`, which never switches to
/// exponent notation and keeps the shortest round-trip digits.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainDecimalFormatter;

fn write_decimal<W: ?Sized + io::Write>(writer: &mut W, text: String) -> io::Result<()> {
    writer.write_all(text.as_bytes())?;
    if !text.contains('.') {
        writer.write_all(b".0")?;
    }
    Ok(())
}

impl serde_json::ser::Formatter for PlainDecimalFormatter {
    fn write_f32<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f32) -> io::Result<()> {
        write_decimal(writer, value.to_string())
    }

    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        write_decimal(writer, value.to_string())
    }
}

/// Non-finite floats become `null`.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ExportError> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PlainDecimalFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|err| ExportError::Serialize(err.to_string()))
}

pub fn export<T: Exportable>(value: &T, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(value),
        ExportFormat::Csv => value.to_csv(),
        ExportFormat::Edl => value.to_edl(T::ARTIFACT),
    }
}

/// Exports `value` and writes it to `path`.
pub fn export_to_path<T: Exportable>(
    value: &T,
    format: ExportFormat,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let text = export(value, format)?;
    write_text(path.as_ref(), &text)
}

/// Writes `lut` as a `.cube` file.
pub fn write_cube(lut: &ColorLut, title: &str, path: impl AsRef<Path>) -> Result<(), ExportError> {
    write_text(path.as_ref(), &lut.to_cube(title))
}

fn write_text(path: &Path, text: &str) -> Result<(), ExportError> {
    std::fs::write(path, text).map_err(|source| ExportError::Destination {
        path: path.to_path_buf(),
        source,
    })
}

fn decimal(value: f32) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

fn csv_text(header: &[&str], rows: impl IntoIterator<Item = Vec<String>>) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Serialize(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ExportError::Serialize(err.to_string()))
}

impl Exportable for PacingPlan {
    const ARTIFACT: &'static str = "pacing plan";

    fn to_csv(&self) -> Result<String, ExportError> {
        csv_text(
            &[
                "index",
                "shot_id",
                "hold_duration",
                "complexity_score",
                "energy_score",
                "cut_style",
                "reasoning",
            ],
            self.shots.iter().enumerate().map(|(index, shot)| {
                vec![
                    index.to_string(),
                    shot.shot_id.to_string(),
                    decimal(shot.hold_duration),
                    decimal(shot.complexity_score),
                    decimal(shot.energy_score),
                    shot.cut_style.as_str().to_owned(),
                    shot.reasoning.clone(),
                ]
            }),
        )
    }

    fn to_edl(&self, title: &str) -> Result<String, ExportError> {
        Ok(edl(&Timeline::from_plan(self, &[]), title))
    }
}

impl Exportable for Vec<PairAnalysis> {
    const ARTIFACT: &'static str = "transition suggestions";

    fn to_csv(&self) -> Result<String, ExportError> {
        csv_text(
            &["source", "target", "rank", "transition_type", "duration", "confidence", "notes"],
            self.iter().flat_map(|pair| {
                pair.suggestions.iter().enumerate().map(|(rank, s)| {
                    vec![
                        s.source.to_string(),
                        s.target.to_string(),
                        (rank + 1).to_string(),
                        s.transition_type.as_str().to_owned(),
                        decimal(s.duration),
                        decimal(s.confidence),
                        s.notes.join("; "),
                    ]
                })
            }),
        )
    }
}

impl Exportable for Timeline {
    const ARTIFACT: &'static str = "timeline";

    fn to_csv(&self) -> Result<String, ExportError> {
        csv_text(
            &["shot_id", "start_seconds", "end_seconds", "transition_in", "transition_duration"],
            self.events.iter().map(|event| {
                vec![
                    event.shot_id.to_string(),
                    decimal(event.start_seconds),
                    decimal(event.end_seconds),
                    event
                        .transition_in
                        .map(|t| t.as_str().to_owned())
                        .unwrap_or_default(),
                    decimal(event.transition_duration),
                ]
            }),
        )
    }

    fn to_edl(&self, title: &str) -> Result<String, ExportError> {
        Ok(edl(self, title))
    }
}

impl Exportable for SequenceReport {
    const ARTIFACT: &'static str = "sequence report";

    /// The per-shot pacing table.
    fn to_csv(&self) -> Result<String, ExportError> {
        match &self.music {
            Some(music) => music.plan.to_csv(),
            None => self.pacing.to_csv(),
        }
    }

    fn to_edl(&self, title: &str) -> Result<String, ExportError> {
        Ok(edl(&self.timeline, title))
    }
}

impl Exportable for ColorLut {
    const ARTIFACT: &'static str = "color lut";
}

/// `HH:MM:SS:FF` at [`EDL_FPS`], non-drop.
pub fn timecode(seconds: f32) -> String {
    let frames = (seconds.max(0.0) * EDL_FPS as f32).round() as u64;
    let fps = EDL_FPS as u64;
    let (ff, total_seconds) = (frames % fps, frames / fps);
    format!(
        "{:02}:{:02}:{:02}:{:02}",
        total_seconds / 3600,
        (total_seconds / 60) % 60,
        total_seconds % 60,
        ff
    )
}

fn edl_code(transition: Option<TransitionType>) -> &'static str {
    match transition {
        None | Some(TransitionType::MatchCut) => "C",
        Some(TransitionType::GradientWipe) => "W001",
        Some(TransitionType::ZoomThrough)
        | Some(TransitionType::Spiral)
        | Some(TransitionType::CrossFade)
        | Some(TransitionType::Dissolve) => "D",
    }
}

/// One event per shot. Every source clip starts at zero; record timecodes
/// follow the timeline.
fn edl(timeline: &Timeline, title: &str) -> String {
    let mut out = format!("TITLE: {title}\nFCM: NON-DROP FRAME\n\n");
    for (index, event) in timeline.events.iter().enumerate() {
        let code = edl_code(event.transition_in);
        let frames = if code == "C" {
            String::from("   ")
        } else {
            format!("{:03}", (event.transition_duration * EDL_FPS as f32).round() as u32)
        };
        out.push_str(&format!(
            "{:03}  AX       V     {:<4} {} {} {} {} {}\n",
            index + 1,
            code,
            frames,
            timecode(0.0),
            timecode(event.duration()),
            timecode(event.start_seconds),
            timecode(event.end_seconds),
        ));
        out.push_str(&format!("* FROM CLIP NAME: {}\n", event.shot_id));
        if let Some(transition) = event.transition_in.filter(|_| code != "C") {
            out.push_str(&format!("* EFFECT NAME: {}\n", transition.as_str()));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PacingConfig,
        ingest::ShotId,
        sequence::{plan_pacing, PacingOptions, ShotMetrics},
        timeline::TimelineEvent,
    };

    fn plan() -> PacingPlan {
        let shots: Vec<ShotMetrics> = [(0.2, 0.7), (0.9, 0.1)]
            .iter()
            .enumerate()
            .map(|(i, (c, e))| ShotMetrics {
                shot_id: ShotId::new(format!("shot,{i}")),
                complexity: *c,
                energy: *e,
            })
            .collect();
        plan_pacing(&shots, &PacingOptions::default(), &PacingConfig::default()).unwrap()
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!(" edl ".parse::<ExportFormat>().unwrap(), ExportFormat::Edl);
        let err = "xml".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedFormat(ref f) if f == "xml"));
    }

    #[test]
    fn json_numbers_stay_plain_decimal() {
        let text = to_json(&[1e-7_f32, 2.0, 1.5e10, f32::NAN]).unwrap();
        assert_eq!(text, "[0.0000001,2.0,15000000000.0,null]");
        let wide = to_json(&vec![0.1_f64, 1e21]).unwrap();
        assert_eq!(wide, "[0.1,1000000000000000000000.0]");
    }

    #[test]
    fn pacing_plan_round_trips_through_json() {
        let plan = plan();
        let text = export(&plan, ExportFormat::Json).unwrap();
        let parsed: PacingPlan = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, plan);
        assert!(!text.contains("e-"));
    }

    #[test]
    fn pacing_csv_has_one_row_per_shot() {
        let text = export(&plan(), ExportFormat::Csv).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("index,shot_id,hold_duration,complexity_score,energy_score,cut_style,reasoning")
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("0,\"shot,0\","));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn edl_lists_cuts_and_dissolves() {
        let timeline = Timeline {
            events: vec![
                TimelineEvent {
                    shot_id: ShotId::new("a"),
                    start_seconds: 0.0,
                    end_seconds: 2.0,
                    transition_in: None,
                    transition_duration: 0.0,
                },
                TimelineEvent {
                    shot_id: ShotId::new("b"),
                    start_seconds: 2.0,
                    end_seconds: 65.5,
                    transition_in: Some(TransitionType::Dissolve),
                    transition_duration: 1.0,
                },
            ],
            total_duration: 65.5,
        };
        let text = timeline.to_edl("demo").unwrap();
        assert!(text.starts_with("TITLE: demo\nFCM: NON-DROP FRAME\n"));
        assert!(text.contains(
            "001  AX       V     C        00:00:00:00 00:00:02:00 00:00:00:00 00:00:02:00"
        ));
        assert!(text.contains(
            "002  AX       V     D    030 00:00:00:00 00:01:03:15 00:00:02:00 00:01:05:15"
        ));
        assert!(text.contains("* FROM CLIP NAME: b\n* EFFECT NAME: dissolve"));
    }

    #[test]
    fn unsupported_combinations_are_errors() {
        let pairs: Vec<PairAnalysis> = Vec::new();
        let err = export(&pairs, ExportFormat::Edl).unwrap_err();
        assert!(format!("{err}").contains("transition suggestions"));
        let lut = ColorLut {
            size: 2,
            red: vec![0.0, 1.0],
            green: vec![0.0, 1.0],
            blue: vec![0.0, 1.0],
        };
        assert!(export(&lut, ExportFormat::Csv).is_err());
        assert!(export(&lut, ExportFormat::Json).is_ok());
    }

    #[test]
    fn unwritable_destinations_are_reported() {
        let err = export_to_path(&plan(), ExportFormat::Json, "/definitely/not/a/dir/plan.json").unwrap_err();
        assert!(matches!(err, ExportError::Destination { .. }));
    }

    #[test]
    fn timecodes_roll_over() {
        assert_eq!(timecode(0.0), "00:00:00:00");
        assert_eq!(timecode(3661.5), "01:01:01:15");
        assert_eq!(timecode(-2.0), "00:00:00:00");
    }
}
