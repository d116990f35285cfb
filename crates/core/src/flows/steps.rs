use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const TOTAL_STEPS: u8 = 7;

/// Collected form fields for one step.
pub type StepFields = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStep {
    Contact,
    Project,
    Materials,
    Layout,
    Finishes,
    Timeline,
    Review,
}

impl QuoteStep {
    pub const ALL: [QuoteStep; TOTAL_STEPS as usize] = [
        QuoteStep::Contact,
        QuoteStep::Project,
        QuoteStep::Materials,
        QuoteStep::Layout,
        QuoteStep::Finishes,
        QuoteStep::Timeline,
        QuoteStep::Review,
    ];

    /// 1-based position in the wizard.
    pub fn number(self) -> u8 {
        match self {
            Self::Contact => 1,
            Self::Project => 2,
            Self::Materials => 3,
            Self::Layout => 4,
            Self::Finishes => 5,
            Self::Timeline => 6,
            Self::Review => 7,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Contact),
            2 => Some(Self::Project),
            3 => Some(Self::Materials),
            4 => Some(Self::Layout),
            5 => Some(Self::Finishes),
            6 => Some(Self::Timeline),
            7 => Some(Self::Review),
            _ => None,
        }
    }

    /// Step to render for a cursor value. Anything outside `1..=TOTAL_STEPS`
    /// renders the first step so the wizard never shows an empty screen.
    pub fn for_cursor(cursor: u8) -> Self {
        Self::from_number(cursor).unwrap_or(Self::Contact)
    }

    pub fn slug(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Project => "project",
            Self::Materials => "materials",
            Self::Layout => "layout",
            Self::Finishes => "finishes",
            Self::Timeline => "timeline",
            Self::Review => "review",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Contact => "Contact details",
            Self::Project => "Project type",
            Self::Materials => "Materials",
            Self::Layout => "Layout",
            Self::Finishes => "Edges & finishes",
            Self::Timeline => "Timeline",
            Self::Review => "Review",
        }
    }
}

impl fmt::Display for QuoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown wizard step `{0}`")]
pub struct UnknownStep(pub String);

/// Accepts either the slug (`materials`) or the 1-based number (`3`).
impl FromStr for QuoteStep {
    type Err = UnknownStep;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Ok(number) = value.parse::<u8>() {
            return Self::from_number(number).ok_or_else(|| UnknownStep(value.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|step| step.slug().eq_ignore_ascii_case(value))
            .ok_or_else(|| UnknownStep(value.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "step")]
pub enum ActiveView {
    Step(QuoteStep),
    Summary,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum WizardCommand {
    Advance,
    Retreat,
    Record { step: QuoteStep, fields: StepFields },
    Submit,
    Reset,
}

impl WizardCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Retreat => "retreat",
            Self::Record { .. } => "record",
            Self::Submit => "submit",
            Self::Reset => "reset",
        }
    }
}

/// Per-quotation wizard data. The cursor is kept inside `1..=TOTAL_STEPS`
/// by the engine; `submitted_at` doubles as the one-way submitted flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WizardState {
    pub(crate) current_step: u8,
    pub(crate) step_data: BTreeMap<QuoteStep, StepFields>,
    pub(crate) submitted_at: Option<DateTime<Utc>>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self { current_step: 1, step_data: BTreeMap::new(), submitted_at: None }
    }
}

impl WizardState {
    pub fn current_step(&self) -> u8 {
        self.current_step
    }

    pub fn total_steps(&self) -> u8 {
        TOTAL_STEPS
    }

    pub fn step_data(&self) -> &BTreeMap<QuoteStep, StepFields> {
        &self.step_data
    }

    pub fn fields(&self, step: QuoteStep) -> Option<&StepFields> {
        self.step_data.get(&step)
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn active_step(&self) -> QuoteStep {
        QuoteStep::for_cursor(self.current_step)
    }

    /// The summary replaces the step renderer for as long as the state is
    /// submitted, whatever the cursor says.
    pub fn active_view(&self) -> ActiveView {
        if self.is_submitted() {
            ActiveView::Summary
        } else {
            ActiveView::Step(self.active_step())
        }
    }
}
