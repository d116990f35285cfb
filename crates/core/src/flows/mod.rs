pub mod engine;
pub mod steps;
pub mod summary;

pub use engine::{AdvancePolicy, WizardEngine, WizardError, WizardOutcome, WizardSnapshot};
pub use steps::{
    ActiveView, QuoteStep, StepFields, UnknownStep, WizardCommand, WizardState, TOTAL_STEPS,
};
pub use summary::{QuoteSummary, SummarySection};
