use crate::timeline::CompiledTimeline;
use crate::transpose::{pitch_name, TransposeAdvisor, TransposeAnalysis, TransposeError};
use clap::Parser;
use std::fmt::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Standard MIDI file to play
    pub file: PathBuf,

    /// TOML settings file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Semitone offset, replaces the suggested one
    #[arg(
        short,
        long,
        allow_hyphen_values = true,
        value_parser = clap::value_parser!(i32).range(-127..=127)
    )]
    pub transpose: Option<i32>,

    /// Print the pitch analysis and exit
    #[arg(long)]
    pub analyze: bool,

    /// Print every compiled note and exit
    #[arg(long)]
    pub timeline: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,

    /// Play through a MIDI output port whose name contains DEVICE
    #[cfg(feature = "midi-output")]
    #[arg(long, value_name = "DEVICE")]
    pub midi_output: Option<String>,
}

impl Args {
    /// Whether the run only reports on the file without playing it
    pub fn report_only(&self) -> bool {
        self.analyze || self.timeline
    }
}

pub fn format_analysis(analysis: &TransposeAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Notes: {} ({} distinct pitches)",
        analysis.total_notes(),
        analysis.histogram.len()
    );
    let _ = writeln!(
        out,
        "Range: {} - {}",
        pitch_name(analysis.lowest),
        pitch_name(analysis.highest)
    );
    let centroid = u8::try_from(analysis.centroid)
        .map(pitch_name)
        .unwrap_or_else(|_| analysis.centroid.to_string());
    let _ = writeln!(out, "Centroid: {}", centroid);
    for (&pitch, &count) in &analysis.histogram {
        let mark = if TransposeAnalysis::in_range(pitch, analysis.suggested) {
            ""
        } else {
            "  (out of range)"
        };
        let _ = writeln!(out, "  {:<4} x{}{}", pitch_name(pitch), count, mark);
    }
    let _ = write!(out, "Suggested transpose: {:+}", analysis.suggested);
    out
}

/// Analysis text for `--analyze`. A file without pitched notes reports a zero
/// offset instead of failing.
pub fn analysis_report(
    advisor: &TransposeAdvisor,
    timeline: &CompiledTimeline,
) -> Result<String, TransposeError> {
    match advisor.analyze(timeline) {
        Ok(analysis) => Ok(format_analysis(&analysis)),
        Err(TransposeError::NoMaterial) => Ok("No pitched notes, transpose 0".to_string()),
        Err(e) => Err(e),
    }
}

pub fn format_timeline(timeline: &CompiledTimeline) -> String {
    let mut out = String::new();
    for note in timeline.notes() {
        let _ = writeln!(
            out,
            "{:>8} ms  {:>6} ms  {:<4} ch{:<2} vel {:.2}",
            note.start_ms,
            note.duration_ms,
            pitch_name(note.midi_note),
            note.channel,
            note.velocity
        );
    }
    let _ = write!(
        out,
        "{} notes, {} ms",
        timeline.len(),
        timeline.duration_ms()
    );
    if timeline.unterminated_count() > 0 || timeline.retriggered_count() > 0 {
        let _ = write!(
            out,
            " ({} unterminated, {} retriggered)",
            timeline.unterminated_count(),
            timeline.retriggered_count()
        );
    }
    out
}
