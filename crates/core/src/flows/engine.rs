use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::errors::FailureClass;
use crate::flows::steps::{
    ActiveView, QuoteStep, StepFields, UnknownStep, WizardCommand, WizardState, TOTAL_STEPS,
};
use crate::flows::summary::QuoteSummary;

/// Fields that must be filled on a step before the wizard may leave it.
/// The default policy blocks nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvancePolicy {
    required: BTreeMap<QuoteStep, Vec<String>>,
}

impl AdvancePolicy {
    pub fn unchecked() -> Self {
        Self::default()
    }

    pub fn require<I, F>(mut self, step: QuoteStep, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.required.entry(step).or_default().extend(fields.into_iter().map(Into::into));
        self
    }

    /// Builds a policy from `wizard.required_fields` (step slug or number
    /// to field names).
    pub fn from_required_fields(
        required_fields: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, UnknownStep> {
        required_fields.iter().try_fold(Self::default(), |policy, (step, fields)| {
            Ok(policy.require(step.parse::<QuoteStep>()?, fields.iter().cloned()))
        })
    }

    pub fn is_unchecked(&self) -> bool {
        self.required.values().all(Vec::is_empty)
    }

    pub fn missing_fields(&self, step: QuoteStep, fields: Option<&StepFields>) -> Vec<String> {
        let Some(required) = self.required.get(&step) else {
            return Vec::new();
        };
        required
            .iter()
            .filter(|name| !fields.and_then(|fields| fields.get(*name)).is_some_and(is_filled))
            .cloned()
            .collect()
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("quotation already submitted; `{command}` is unavailable until the wizard is reset")]
    Submitted { command: &'static str },
    #[error("missing required fields on step `{step}`: {missing_fields:?}")]
    MissingRequiredFields { step: QuoteStep, missing_fields: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WizardOutcome {
    pub command: &'static str,
    pub from_step: u8,
    pub to_step: u8,
    /// The request pointed outside the step range and was held at the edge.
    pub clamped: bool,
    pub view: ActiveView,
}

/// What a step-content component needs to render the current position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WizardSnapshot {
    pub current_step: u8,
    pub total_steps: u8,
    pub step: QuoteStep,
    pub title: &'static str,
    pub submitted: bool,
    pub view: ActiveView,
    pub fields: StepFields,
}

/// Owns one quotation attempt: cursor, collected data and the one-way
/// submitted flag.
#[derive(Clone, Debug, Default)]
pub struct WizardEngine {
    policy: AdvancePolicy,
    state: WizardState,
}

impl WizardEngine {
    pub fn new(policy: AdvancePolicy) -> Self {
        Self { policy, state: WizardState::default() }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn policy(&self) -> &AdvancePolicy {
        &self.policy
    }

    pub fn advance(&mut self) -> Result<WizardOutcome, WizardError> {
        self.ensure_editable("advance")?;
        let step = self.state.active_step();
        let missing = self.policy.missing_fields(step, self.state.fields(step));
        if !missing.is_empty() {
            return Err(WizardError::MissingRequiredFields { step, missing_fields: missing });
        }

        let target = u16::from(self.state.current_step) + 1;
        Ok(self.move_cursor("advance", target))
    }

    pub fn retreat(&mut self) -> Result<WizardOutcome, WizardError> {
        self.ensure_editable("retreat")?;
        let target = u16::from(self.state.current_step).saturating_sub(1);
        Ok(self.move_cursor("retreat", target))
    }

    /// Merges `fields` into the step's data; keys already present are
    /// overwritten, other keys are kept. The cursor does not move.
    pub fn record_step_data(
        &mut self,
        step: QuoteStep,
        fields: StepFields,
    ) -> Result<WizardOutcome, WizardError> {
        self.ensure_editable("record")?;
        self.state.step_data.entry(step).or_default().extend(fields);
        Ok(self.outcome("record", self.state.current_step, false))
    }

    pub fn submit(&mut self) -> Result<WizardOutcome, WizardError> {
        self.ensure_editable("submit")?;
        for step in QuoteStep::ALL {
            let missing = self.policy.missing_fields(step, self.state.fields(step));
            if !missing.is_empty() {
                return Err(WizardError::MissingRequiredFields { step, missing_fields: missing });
            }
        }

        self.state.submitted_at = Some(Utc::now());
        Ok(self.outcome("submit", self.state.current_step, false))
    }

    /// Starts a fresh quotation; the only way out of the submitted state.
    pub fn reset(&mut self) -> WizardOutcome {
        let from = self.state.current_step;
        self.state = WizardState::default();
        WizardOutcome {
            command: "reset",
            from_step: from,
            to_step: self.state.current_step,
            clamped: false,
            view: self.state.active_view(),
        }
    }

    pub fn apply(&mut self, command: WizardCommand) -> Result<WizardOutcome, WizardError> {
        match command {
            WizardCommand::Advance => self.advance(),
            WizardCommand::Retreat => self.retreat(),
            WizardCommand::Record { step, fields } => self.record_step_data(step, fields),
            WizardCommand::Submit => self.submit(),
            WizardCommand::Reset => Ok(self.reset()),
        }
    }

    pub fn apply_with_audit<S>(
        &mut self,
        command: WizardCommand,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<WizardOutcome, WizardError>
    where
        S: AuditSink + ?Sized,
    {
        let name = command.name();
        let result = self.apply(command);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "wizard.command_applied",
                        AuditCategory::Wizard,
                        AuditOutcome::Success,
                    )
                    .with_metadata("command", name)
                    .with_metadata("from", outcome.from_step.to_string())
                    .with_metadata("to", outcome.to_step.to_string())
                    .with_metadata("clamped", outcome.clamped.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "wizard.command_rejected",
                        AuditCategory::Wizard,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("command", name)
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        let step = self.state.active_step();
        WizardSnapshot {
            current_step: self.state.current_step,
            total_steps: TOTAL_STEPS,
            step,
            title: step.title(),
            submitted: self.state.is_submitted(),
            view: self.state.active_view(),
            fields: self.state.fields(step).cloned().unwrap_or_default(),
        }
    }

    pub fn summary(&self) -> Option<QuoteSummary> {
        QuoteSummary::from_state(&self.state)
    }

    fn ensure_editable(&self, command: &'static str) -> Result<(), WizardError> {
        if self.state.is_submitted() {
            return Err(WizardError::Submitted { command });
        }
        Ok(())
    }

    fn move_cursor(&mut self, command: &'static str, target: u16) -> WizardOutcome {
        let from = self.state.current_step;
        let bounded = target.clamp(1, u16::from(TOTAL_STEPS));
        let clamped = bounded != target;
        if clamped {
            debug!(
                event_name = "wizard.cursor.clamped",
                failure_class = FailureClass::WizardRangeViolation.as_str(),
                command,
                requested = target,
                held_at = bounded,
                "wizard cursor request clamped to step range"
            );
        }
        // bounded <= TOTAL_STEPS, so the narrowing cannot fail.
        self.state.current_step = u8::try_from(bounded).unwrap_or(TOTAL_STEPS);
        self.outcome(command, from, clamped)
    }

    fn outcome(&self, command: &'static str, from: u8, clamped: bool) -> WizardOutcome {
        WizardOutcome {
            command,
            from_step: from,
            to_step: self.state.current_step,
            clamped,
            view: self.state.active_view(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::flows::engine::{AdvancePolicy, WizardEngine, WizardError};
    use crate::flows::steps::{ActiveView, QuoteStep, StepFields, WizardCommand, TOTAL_STEPS};

    fn fields(pairs: &[(&str, serde_json::Value)]) -> StepFields {
        pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
    }

    #[test]
    fn six_advances_reach_the_last_step_and_a_seventh_is_clamped() {
        let mut engine = WizardEngine::default();
        for _ in 0..6 {
            engine.advance().expect("advance");
        }
        assert_eq!(engine.state().current_step(), TOTAL_STEPS);

        let outcome = engine.advance().expect("advance past end");
        assert_eq!(engine.state().current_step(), 7);
        assert!(outcome.clamped);
        assert_eq!(outcome.from_step, 7);
        assert_eq!(outcome.to_step, 7);
    }

    #[test]
    fn retreat_from_first_step_is_clamped() {
        let mut engine = WizardEngine::default();
        let outcome = engine.retreat().expect("retreat");
        assert_eq!(engine.state().current_step(), 1);
        assert!(outcome.clamped);
    }

    #[test]
    fn cursor_stays_in_range_for_arbitrary_sequences() {
        let mut engine = WizardEngine::default();
        // Deterministic pseudo-random walk biased in both directions.
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let command = if seed % 3 == 0 { WizardCommand::Retreat } else { WizardCommand::Advance };
            let command = if seed % 7 == 0 { WizardCommand::Retreat } else { command };
            engine.apply(command).expect("unchecked wizard never refuses movement");
            let step = engine.state().current_step();
            assert!((1..=TOTAL_STEPS).contains(&step), "cursor escaped range: {step}");
        }
    }

    #[test]
    fn step_data_survives_navigation() {
        let mut engine = WizardEngine::default();
        engine.advance().expect("to 2");
        engine.advance().expect("to 3");
        engine
            .record_step_data(QuoteStep::Materials, fields(&[("material", json!("granite"))]))
            .expect("record");

        engine.retreat().expect("to 2");
        assert_eq!(engine.state().current_step(), 2);
        engine.advance().expect("back to 3");

        assert_eq!(
            engine.state().fields(QuoteStep::Materials),
            Some(&fields(&[("material", json!("granite"))]))
        );
        assert_eq!(engine.snapshot().fields, fields(&[("material", json!("granite"))]));
    }

    #[test]
    fn recording_merges_and_overwrites_per_key_without_moving() {
        let mut engine = WizardEngine::default();
        engine
            .record_step_data(
                QuoteStep::Contact,
                fields(&[("name", json!("Ada")), ("phone", json!("555"))]),
            )
            .expect("first");
        let outcome = engine
            .record_step_data(QuoteStep::Contact, fields(&[("phone", json!("556"))]))
            .expect("second");

        assert_eq!(outcome.to_step, 1);
        assert_eq!(
            engine.state().fields(QuoteStep::Contact),
            Some(&fields(&[("name", json!("Ada")), ("phone", json!("556"))]))
        );
    }

    #[test]
    fn submission_is_sticky_until_reset() {
        let mut engine = WizardEngine::default();
        engine.advance().expect("to 2");
        let submitted = engine.submit().expect("submit");
        assert_eq!(submitted.view, ActiveView::Summary);

        assert_eq!(engine.advance(), Err(WizardError::Submitted { command: "advance" }));
        assert_eq!(engine.retreat(), Err(WizardError::Submitted { command: "retreat" }));
        assert_eq!(
            engine.record_step_data(QuoteStep::Layout, fields(&[("shape", json!("L"))])),
            Err(WizardError::Submitted { command: "record" })
        );
        assert_eq!(engine.submit(), Err(WizardError::Submitted { command: "submit" }));

        assert!(engine.state().is_submitted());
        assert_eq!(engine.state().active_view(), ActiveView::Summary);
        assert_eq!(engine.state().current_step(), 2);
        assert!(engine.state().fields(QuoteStep::Layout).is_none());
    }

    #[test]
    fn reset_after_submit_restores_the_initial_state_exactly() {
        let mut engine = WizardEngine::default();
        engine
            .record_step_data(QuoteStep::Contact, fields(&[("name", json!("Ada"))]))
            .expect("record");
        engine.advance().expect("advance");
        engine.submit().expect("submit");

        let outcome = engine.reset();

        assert_eq!(outcome.to_step, 1);
        assert_eq!(engine.state(), &crate::flows::steps::WizardState::default());
        assert_eq!(engine.state().active_view(), ActiveView::Step(QuoteStep::Contact));
    }

    #[test]
    fn summary_is_only_available_once_submitted() {
        let mut engine = WizardEngine::default();
        assert!(engine.summary().is_none());
        engine.submit().expect("submit");
        assert!(engine.summary().is_some());
    }

    #[test]
    fn required_field_policy_blocks_advance_until_filled() {
        let mut engine =
            WizardEngine::new(AdvancePolicy::unchecked().require(QuoteStep::Contact, ["email"]));

        let error = engine.advance().expect_err("email missing");
        assert_eq!(
            error,
            WizardError::MissingRequiredFields {
                step: QuoteStep::Contact,
                missing_fields: vec!["email".to_string()],
            }
        );
        assert_eq!(engine.state().current_step(), 1);

        engine
            .record_step_data(QuoteStep::Contact, fields(&[("email", json!("  "))]))
            .expect("record blank");
        assert!(engine.advance().is_err(), "blank strings do not count as filled");

        engine
            .record_step_data(QuoteStep::Contact, fields(&[("email", json!("a@example.com"))]))
            .expect("record");
        engine.advance().expect("advance once filled");
        assert_eq!(engine.state().current_step(), 2);
    }

    #[test]
    fn required_field_policy_also_guards_submit() {
        let mut engine =
            WizardEngine::new(AdvancePolicy::unchecked().require(QuoteStep::Materials, ["material"]));

        let error = engine.submit().expect_err("materials incomplete");
        assert!(matches!(
            error,
            WizardError::MissingRequiredFields { step: QuoteStep::Materials, .. }
        ));
        assert!(!engine.state().is_submitted());
    }

    #[test]
    fn policy_builds_from_configured_slugs_and_numbers() {
        let mut configured = BTreeMap::new();
        configured.insert("materials".to_string(), vec!["material".to_string()]);
        configured.insert("1".to_string(), vec!["email".to_string()]);

        let policy = AdvancePolicy::from_required_fields(&configured).expect("policy");
        assert_eq!(policy.missing_fields(QuoteStep::Contact, None), vec!["email".to_string()]);
        assert_eq!(
            policy.missing_fields(QuoteStep::Materials, None),
            vec!["material".to_string()]
        );
        assert!(policy.missing_fields(QuoteStep::Layout, None).is_empty());

        configured.insert("plumbing".to_string(), vec![]);
        assert!(AdvancePolicy::from_required_fields(&configured).is_err());
    }

    #[test]
    fn wizard_commands_emit_audit_events() {
        let mut engine = WizardEngine::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some("ctx-7".to_owned()), "req-42", "u@example.com");

        engine.apply_with_audit(WizardCommand::Advance, &sink, &audit).expect("advance");
        engine.apply_with_audit(WizardCommand::Submit, &sink, &audit).expect("submit");
        let _ = engine.apply_with_audit(WizardCommand::Retreat, &sink, &audit);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, "wizard.command_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("2"));
        assert_eq!(events[2].event_type, "wizard.command_rejected");
        assert_eq!(events[2].correlation_id, "req-42");
    }
}
