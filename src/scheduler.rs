//! Turn scheduler
//!
//! The session advances its question flow by planning exactly one upcoming
//! step at a time: "ask for the first chooser in 2 seconds", "announce the
//! answer verdict now". The step is armed through a `schedule_alarm`
//! closure supplied by the host harness, which later hands the fired alarm
//! back to the session. Every plan carries an epoch; re-planning,
//! cancelling or pausing bumps the epoch so that alarms armed for a
//! superseded plan are recognized as stale and ignored. Pausing captures
//! the remaining delay, resuming re-arms it, so a pause round-trip never
//! loses or duplicates a step.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use web_time::SystemTime;

use crate::decision::StopReason;

/// A continuation of the question/turn state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Pre-game countdown of an automatic game elapsed
    AutoStart,
    /// Transition from the lobby into the first round
    StartGame,
    /// Advance the engine: next round, next choice or game end
    MoveNext,
    /// Ask the showman who plays first
    AskFirst,
    /// Ask the chooser to pick a question
    AskToChoose,
    /// Announce the chosen question and branch on its kind
    QuestionSelected,
    /// Open the button window
    AskToTry,
    /// Button window elapsed with no answerer
    WaitTry,
    /// Reopen the button window for the remaining players
    ContinueQuestion,
    /// Ask the current answerer for their answer
    AskAnswer,
    /// Ask the showman to validate the recorded answer
    AskRight,
    /// Apply the validation outcome to scores and history
    ApplyAnswer,
    /// Ask the chooser to hand over the secret question
    AskCat,
    /// Ask the receiver to pick the secret question cost
    AskCatCost,
    /// Ask the current staker for a stake
    AskStake,
    /// Announce the auction winner and move to their answer
    PrintStakerPlayer,
    /// Ask the current deleter to remove a final theme
    AskToDelete,
    /// Collect final-round stakes
    AskFinalStake,
    /// Announce the final question once every stake is in
    PlayFinalQuestion,
    /// Walk the recorded final answers through validation
    AnnounceFinal,
    /// Begin a pending appellation vote
    StartAppellation,
    /// Tally the appellation votes and adjust scores
    FinishAppellation,
    /// Announce the winner and request reports
    Winner,
    /// Tear the session down after reports
    EndGame,
}

/// A scheduled wake-up delivered back to the session by the host harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmMessage {
    /// Plan epoch this alarm was armed for
    pub epoch: u64,
    /// The continuation to execute
    pub step: Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PlannedStep {
    step: Step,
    due: SystemTime,
    /// Captured while paused: how much of the delay was still left
    remaining: Option<Duration>,
}

/// Single-slot, epoch-guarded step scheduler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnScheduler {
    epoch: u64,
    planned: Option<PlannedStep>,
    paused: bool,
    stop_reason: StopReason,
}

impl TurnScheduler {
    /// Plans (or replaces) the upcoming step
    ///
    /// While paused, the plan is recorded but not armed; [`Self::resume`]
    /// arms it with the stored delay.
    pub fn plan<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        step: Step,
        delay: Duration,
        now: SystemTime,
        schedule_alarm: &mut S,
    ) {
        self.epoch += 1;
        if self.paused {
            self.planned = Some(PlannedStep {
                step,
                due: now.checked_add(delay).unwrap_or(now),
                remaining: Some(delay),
            });
        } else {
            self.planned = Some(PlannedStep {
                step,
                due: now.checked_add(delay).unwrap_or(now),
                remaining: None,
            });
            schedule_alarm(
                AlarmMessage {
                    epoch: self.epoch,
                    step,
                },
                delay,
            );
        }
    }

    /// Re-arms the current plan to fire immediately
    pub fn execute_immediate<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        now: SystemTime,
        schedule_alarm: &mut S,
    ) {
        if let Some(planned) = self.planned {
            self.plan(planned.step, Duration::ZERO, now, schedule_alarm);
        }
    }

    /// Re-arms the current plan with a shorter delay
    ///
    /// Used to cut a long media/thinking wait down once every player has
    /// gone silent.
    pub fn accelerate<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        delay: Duration,
        now: SystemTime,
        schedule_alarm: &mut S,
    ) {
        if let Some(planned) = self.planned {
            self.plan(planned.step, delay, now, schedule_alarm);
        }
    }

    /// Validates a fired alarm and takes its step if it is still current
    ///
    /// Stale alarms (superseded, cancelled or armed before a pause) return
    /// `None` and must be ignored by the caller.
    pub fn claim(&mut self, alarm: &AlarmMessage) -> Option<Step> {
        if self.paused || alarm.epoch != self.epoch {
            return None;
        }
        self.planned.take().map(|planned| planned.step)
    }

    /// Drops the current plan
    pub fn cancel(&mut self) {
        self.planned = None;
        self.epoch += 1;
    }

    /// Suspends the scheduler, capturing the remaining delay of the plan
    pub fn pause(&mut self, now: SystemTime) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.epoch += 1;
        if let Some(planned) = &mut self.planned {
            planned.remaining = Some(
                planned
                    .due
                    .duration_since(now)
                    .unwrap_or(Duration::ZERO),
            );
        }
    }

    /// Resumes the scheduler, re-arming the captured plan
    pub fn resume<S: FnMut(AlarmMessage, Duration)>(
        &mut self,
        now: SystemTime,
        schedule_alarm: &mut S,
    ) {
        if !self.paused {
            return;
        }
        self.paused = false;
        if let Some(planned) = self.planned {
            let delay = planned.remaining.unwrap_or(Duration::ZERO);
            self.plan(planned.step, delay, now, schedule_alarm);
        }
    }

    /// Whether the scheduler is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether no step is planned
    pub fn is_idle(&self) -> bool {
        self.planned.is_none()
    }

    /// The step currently planned, if any
    pub fn planned_step(&self) -> Option<Step> {
        self.planned.map(|planned| planned.step)
    }

    /// Why the current wait was interrupted
    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    /// Records why the current wait was interrupted
    pub fn set_stop_reason(&mut self, reason: StopReason) {
        self.stop_reason = reason;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    type Armed = Rc<RefCell<Vec<(AlarmMessage, Duration)>>>;

    fn sink() -> (Armed, impl FnMut(AlarmMessage, Duration)) {
        let armed: Armed = Rc::default();
        let writer = Rc::clone(&armed);
        (armed, move |alarm, delay| {
            writer.borrow_mut().push((alarm, delay));
        })
    }

    #[test]
    fn plan_and_claim() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.plan(Step::MoveNext, Duration::from_secs(2), now, &mut schedule);

        let (alarm, delay) = armed.borrow()[0];
        assert_eq!(delay, Duration::from_secs(2));
        assert_eq!(scheduler.claim(&alarm), Some(Step::MoveNext));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn replanning_makes_earlier_alarms_stale() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.plan(Step::WaitTry, Duration::from_secs(60), now, &mut schedule);
        scheduler.plan(Step::WaitTry, Duration::from_secs(3), now, &mut schedule);

        let stale = armed.borrow()[0].0;
        let current = armed.borrow()[1].0;
        assert_eq!(scheduler.claim(&stale), None);
        assert_eq!(scheduler.claim(&current), Some(Step::WaitTry));
    }

    #[test]
    fn cancelled_plan_cannot_fire() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.plan(Step::AskFirst, Duration::from_secs(2), now, &mut schedule);
        scheduler.cancel();

        let alarm = armed.borrow()[0].0;
        assert_eq!(scheduler.claim(&alarm), None);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn pause_captures_remaining_delay() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.plan(Step::WaitTry, Duration::from_secs(10), now, &mut schedule);
        scheduler.pause(now + Duration::from_secs(4));

        // The pre-pause alarm is stale now.
        let stale = armed.borrow()[0].0;
        assert_eq!(scheduler.claim(&stale), None);

        scheduler.resume(now + Duration::from_secs(60), &mut schedule);
        let (alarm, delay) = armed.borrow()[1];
        assert_eq!(delay, Duration::from_secs(6));
        assert_eq!(scheduler.claim(&alarm), Some(Step::WaitTry));
    }

    #[test]
    fn plans_made_while_paused_arm_on_resume() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.pause(now);
        scheduler.plan(Step::MoveNext, Duration::from_secs(5), now, &mut schedule);
        assert!(armed.borrow().is_empty());

        scheduler.resume(now, &mut schedule);
        let (alarm, delay) = armed.borrow()[0];
        assert_eq!(delay, Duration::from_secs(5));
        assert_eq!(scheduler.claim(&alarm), Some(Step::MoveNext));
    }

    #[test]
    fn claims_are_rejected_while_paused() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.plan(Step::Winner, Duration::from_secs(1), now, &mut schedule);
        let alarm = armed.borrow()[0].0;
        scheduler.pause(now);
        assert_eq!(scheduler.claim(&alarm), None);
    }

    #[test]
    fn execute_immediate_rearms_with_zero_delay() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.plan(Step::Winner, Duration::from_secs(30), now, &mut schedule);
        scheduler.execute_immediate(now, &mut schedule);

        let (alarm, delay) = armed.borrow()[1];
        assert_eq!(delay, Duration::ZERO);
        assert_eq!(scheduler.claim(&alarm), Some(Step::Winner));
    }

    #[test]
    fn accelerate_shortens_the_wait() {
        let (armed, mut schedule) = sink();
        let now = SystemTime::now();
        let mut scheduler = TurnScheduler::default();

        scheduler.plan(Step::WaitTry, Duration::from_secs(60), now, &mut schedule);
        scheduler.accelerate(Duration::from_secs(3), now, &mut schedule);

        let (alarm, delay) = armed.borrow()[1];
        assert_eq!(delay, Duration::from_secs(3));
        assert_eq!(scheduler.claim(&alarm), Some(Step::WaitTry));
    }
}
