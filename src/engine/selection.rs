use serde::Serialize;

/// Which patient is currently in view
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "patient_id", rename_all = "lowercase")]
pub enum SelectionState {
    #[default]
    Unselected,
    Selected(String),
}

impl SelectionState {
    pub fn patient_id(&self) -> Option<&str> {
        match self {
            SelectionState::Selected(patient_id) => Some(patient_id),
            SelectionState::Unselected => None,
        }
    }
}

/// Identity of a selection-scoped fetch, captured when it was issued.
///
/// The generation changes on every `select`, so a fetch for the same
/// patient issued before a re-selection is stale as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTag {
    pub patient_id: String,
    pub generation: u64,
}

/// Hands out tags and answers whether a tag is still live
#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    state: SelectionState,
    generation: u64,
}

impl SelectionController {
    pub fn new() -> Self {
        SelectionController::default()
    }

    /// Move to `patient_id` and invalidate every earlier tag
    pub fn select(&mut self, patient_id: &str) -> FetchTag {
        self.generation += 1;
        self.state = SelectionState::Selected(patient_id.to_string());
        FetchTag {
            patient_id: patient_id.to_string(),
            generation: self.generation,
        }
    }

    pub fn is_current(&self, tag: &FetchTag) -> bool {
        tag.generation == self.generation && self.state.patient_id() == Some(tag.patient_id.as_str())
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }
}
