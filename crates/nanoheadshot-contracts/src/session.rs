use serde::{Deserialize, Serialize};

use crate::styles::StyleChoice;

/// The photo the user selected as the edit source.
///
/// Invariant: `mime_type` is non-empty whenever a `SourceImage` exists;
/// construction goes through the data-URL codec, which rejects empty
/// MIME types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceImage {
    pub data_url: String,
    pub mime_type: String,
}

/// Lifecycle of one edit request. Exactly one variant is active at a time,
/// so an error message can never coexist with an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GenerationStatus {
    Idle,
    InFlight,
    Succeeded(String),
    Failed(String),
}

impl Default for GenerationStatus {
    fn default() -> Self {
        GenerationStatus::Idle
    }
}

impl GenerationStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, GenerationStatus::InFlight)
    }

    pub fn label(&self) -> &'static str {
        match self {
            GenerationStatus::Idle => "idle",
            GenerationStatus::InFlight => "in_flight",
            GenerationStatus::Succeeded(_) => "succeeded",
            GenerationStatus::Failed(_) => "failed",
        }
    }
}

/// Read-only copy of the session handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub source_image: Option<SourceImage>,
    pub style: StyleChoice,
    pub status: GenerationStatus,
    pub read_error: Option<String>,
}

/// Sole owner of the workflow's mutable state. All mutation goes through
/// the transition methods below; callers read via [`SessionState::snapshot`].
///
/// A failed source read is tracked in `read_error`, separate from
/// `GenerationStatus::Failed`: it is surfaced to the user the same way but
/// does not count as a generation attempt.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    source_image: Option<SourceImage>,
    style: StyleChoice,
    status: GenerationStatus,
    read_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_image(&self) -> Option<&SourceImage> {
        self.source_image.as_ref()
    }

    pub fn style(&self) -> &StyleChoice {
        &self.style
    }

    pub fn status(&self) -> &GenerationStatus {
        &self.status
    }

    pub fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }

    /// A fresh source resets any previous result and read error.
    pub fn set_source(&mut self, image: SourceImage) {
        self.source_image = Some(image);
        self.read_error = None;
        self.status = GenerationStatus::Idle;
    }

    /// Records a failed source read. The existing source image and the
    /// generation status are deliberately left untouched.
    pub fn note_read_error(&mut self, message: impl Into<String>) {
        self.read_error = Some(message.into());
    }

    pub fn clear_source(&mut self) {
        self.source_image = None;
        self.read_error = None;
        self.status = GenerationStatus::Idle;
    }

    pub fn set_style(&mut self, style: StyleChoice) {
        self.style = style;
    }

    pub fn begin_generation(&mut self) {
        self.status = GenerationStatus::InFlight;
    }

    pub fn succeed(&mut self, result_data_url: impl Into<String>) {
        self.status = GenerationStatus::Succeeded(result_data_url.into());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = GenerationStatus::Failed(message.into());
    }

    /// From `Succeeded`, returns to `Idle` keeping the source image and
    /// style so the user can try another style on the same photo. A no-op
    /// in every other status.
    pub fn reset_result(&mut self) {
        if matches!(self.status, GenerationStatus::Succeeded(_)) {
            self.status = GenerationStatus::Idle;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source_image: self.source_image.clone(),
            style: self.style.clone(),
            status: self.status.clone(),
            read_error: self.read_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::styles::StyleChoice;

    use super::{GenerationStatus, SessionState, SourceImage};

    fn sample_image() -> SourceImage {
        SourceImage {
            data_url: "data:image/png;base64,AAAA".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn fresh_session_is_idle_with_no_source() {
        let state = SessionState::new();
        assert!(state.source_image().is_none());
        assert_eq!(state.status(), &GenerationStatus::Idle);
        assert!(state.read_error().is_none());
    }

    #[test]
    fn generation_transitions_are_sequential() {
        let mut state = SessionState::new();
        state.set_source(sample_image());

        state.begin_generation();
        assert!(state.status().is_in_flight());

        state.succeed("data:image/png;base64,BBBB");
        assert_eq!(
            state.status(),
            &GenerationStatus::Succeeded("data:image/png;base64,BBBB".to_string())
        );

        state.reset_result();
        assert_eq!(state.status(), &GenerationStatus::Idle);

        state.begin_generation();
        state.fail("quota exceeded");
        assert_eq!(
            state.status(),
            &GenerationStatus::Failed("quota exceeded".to_string())
        );
    }

    #[test]
    fn reset_result_keeps_source_and_style() {
        let mut state = SessionState::new();
        state.set_source(sample_image());
        state.set_style(StyleChoice::Custom("vaporwave".to_string()));
        state.succeed("data:image/png;base64,BBBB");

        state.reset_result();
        assert_eq!(state.source_image(), Some(&sample_image()));
        assert_eq!(
            state.style(),
            &StyleChoice::Custom("vaporwave".to_string())
        );
        assert_eq!(state.status(), &GenerationStatus::Idle);
    }

    #[test]
    fn reset_result_is_noop_outside_succeeded() {
        let mut state = SessionState::new();
        state.fail("boom");
        state.reset_result();
        assert_eq!(state.status(), &GenerationStatus::Failed("boom".to_string()));
    }

    #[test]
    fn read_error_leaves_source_and_status_alone() {
        let mut state = SessionState::new();
        state.set_source(sample_image());
        state.succeed("data:image/png;base64,BBBB");

        state.note_read_error("could not read file");
        assert_eq!(state.read_error(), Some("could not read file"));
        assert_eq!(state.source_image(), Some(&sample_image()));
        assert_eq!(
            state.status(),
            &GenerationStatus::Succeeded("data:image/png;base64,BBBB".to_string())
        );

        state.set_source(sample_image());
        assert!(state.read_error().is_none());
        assert_eq!(state.status(), &GenerationStatus::Idle);
    }

    #[test]
    fn clear_source_resets_everything() {
        let mut state = SessionState::new();
        state.set_source(sample_image());
        state.note_read_error("stale");
        state.succeed("data:image/png;base64,BBBB");

        state.clear_source();
        assert!(state.source_image().is_none());
        assert!(state.read_error().is_none());
        assert_eq!(state.status(), &GenerationStatus::Idle);
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let mut state = SessionState::new();
        state.set_source(sample_image());
        state.set_style(StyleChoice::Preset("studio-white".to_string()));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.source_image, Some(sample_image()));
        assert_eq!(snapshot.style, StyleChoice::Preset("studio-white".to_string()));
        assert_eq!(snapshot.status, GenerationStatus::Idle);
        assert!(snapshot.read_error.is_none());
    }
}
