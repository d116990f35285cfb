use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::flows::steps::{QuoteStep, StepFields, WizardState};

/// Read-only projection of a submitted quotation, one section per step in
/// wizard order. Steps with no recorded data still get an empty section.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteSummary {
    pub submitted_at: DateTime<Utc>,
    pub sections: Vec<SummarySection>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummarySection {
    pub step: QuoteStep,
    pub number: u8,
    pub title: &'static str,
    pub fields: StepFields,
}

impl QuoteSummary {
    pub fn from_state(state: &WizardState) -> Option<Self> {
        let submitted_at = state.submitted_at()?;
        let sections = QuoteStep::ALL
            .into_iter()
            .map(|step| SummarySection {
                step,
                number: step.number(),
                title: step.title(),
                fields: state.fields(step).cloned().unwrap_or_default(),
            })
            .collect();
        Some(Self { submitted_at, sections })
    }

    pub fn section(&self, step: QuoteStep) -> Option<&SummarySection> {
        self.sections.iter().find(|section| section.step == step)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::QuoteSummary;
    use crate::flows::steps::{QuoteStep, WizardState, TOTAL_STEPS};

    #[test]
    fn unsubmitted_state_has_no_summary() {
        assert!(QuoteSummary::from_state(&WizardState::default()).is_none());
    }

    #[test]
    fn summary_lists_every_step_in_order() {
        let mut state = WizardState::default();
        state
            .step_data
            .entry(QuoteStep::Materials)
            .or_default()
            .insert("material".to_string(), json!("quartz"));
        state.submitted_at = Some(Utc::now());

        let summary = QuoteSummary::from_state(&state).expect("submitted");

        assert_eq!(summary.sections.len(), usize::from(TOTAL_STEPS));
        assert_eq!(summary.sections[0].step, QuoteStep::Contact);
        assert!(summary.sections[0].fields.is_empty());
        let materials = summary.section(QuoteStep::Materials).expect("materials section");
        assert_eq!(materials.number, 3);
        assert_eq!(materials.fields.get("material"), Some(&json!("quartz")));
    }
}
