// Generation trace: the auditable record of a run.
//
// Every committed cell appends one `TraceStep` holding the full prediction
// tensor the decision was drawn from, the single-cell edit, and a snapshot
// of the generated score after the edit. The trace is append-only while
// the scheduler owns it and handed to the caller whole at the end of the
// run; downstream consumers replay it for audit or step-through
// visualization without ever mutating it.
//
// Traces serialize as JSON. A trace for a full run is large (one
// prediction tensor per cell), which is the point: it is the complete
// evidence for how the piece came to be.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use voiceweave_roll::{Pianoroll, Prediction};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single committed decision: (timestep, pitch, instrument) set to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEdit {
    pub timestep: usize,
    pub pitch: usize,
    pub instrument: usize,
}

/// One step of the generation process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// The full per-cell distribution tensor used for this decision.
    pub prediction: Prediction,
    /// The edit applied.
    pub edit: CellEdit,
    /// The generated score after the edit.
    pub generated: Pianoroll,
}

/// Ordered, append-only sequence of generation steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationTrace {
    steps: Vec<TraceStep>,
}

impl GenerationTrace {
    pub fn new() -> Self {
        GenerationTrace { steps: Vec::new() }
    }

    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn last(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    /// Write the whole trace as JSON.
    pub fn save(&self, path: &Path) -> Result<(), TraceError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a trace back from JSON.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voiceweave_roll::Shape;

    fn step(t: usize, p: usize, i: usize, shape: Shape) -> TraceStep {
        let mut generated = Pianoroll::zeros(shape);
        generated.set(t, p, i, 1.0);
        TraceStep {
            prediction: Prediction::uniform(shape),
            edit: CellEdit {
                timestep: t,
                pitch: p,
                instrument: i,
            },
            generated,
        }
    }

    #[test]
    fn test_trace_grows_in_order() {
        let shape = Shape::new(2, 4, 2);
        let mut trace = GenerationTrace::new();
        assert!(trace.is_empty());

        trace.push(step(0, 1, 0, shape));
        trace.push(step(1, 3, 1, shape));

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.steps()[0].edit.pitch, 1);
        assert_eq!(trace.last().unwrap().edit.timestep, 1);
    }

    #[test]
    fn test_trace_file_roundtrip() {
        let shape = Shape::new(2, 4, 2);
        let mut trace = GenerationTrace::new();
        trace.push(step(0, 2, 1, shape));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        trace.save(&path).unwrap();

        let restored = GenerationTrace::load(&path).unwrap();
        assert_eq!(trace, restored);
    }
}
