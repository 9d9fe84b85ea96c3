/// Ticks between a reload request and the unload, about one second at 60
/// ticks per second. Gives the build time to finish writing the binary.
pub const DEFAULT_GRACE_TICKS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    ArmedDelay { remaining: u32 },
    Unloading,
    Reloading,
    Fatal,
}

/// Trigger bookkeeping owned by the [`ReloadStateMachine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadContext {
    /// A trigger has been accepted and its reload has not completed yet.
    pub trigger_latched: bool,
    /// Flag value seen on the previous tick, reset when a new module instance
    /// is loaded. A trigger is accepted when the flag is seen true and this is
    /// false, so a request latched by one instance causes one reload.
    pub last_observed: bool,
    pub grace_counter: u32,
}

/// Result of [`ReloadStateMachine::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStep {
    /// Keep running frames.
    Wait,
    /// The grace period is over; unload and reload now.
    Proceed,
}

/// `Idle → ArmedDelay → Unloading → Reloading → Idle`, with `Fatal` reachable
/// from the last two.
///
/// The machine only keeps count. The host performs the unload and reload and
/// reports progress through [`begin_unload`](Self::begin_unload),
/// [`begin_reload`](Self::begin_reload), [`complete`](Self::complete) and
/// [`fail`](Self::fail).
#[derive(Debug, Clone)]
pub struct ReloadStateMachine {
    state: ReloadState,
    context: ReloadContext,
    grace_ticks: u32,
}

impl Default for ReloadStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE_TICKS)
    }
}

impl ReloadStateMachine {
    pub fn new(grace_ticks: u32) -> Self {
        Self {
            state: ReloadState::Idle,
            context: ReloadContext::default(),
            grace_ticks,
        }
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    pub fn context(&self) -> &ReloadContext {
        &self.context
    }

    pub fn grace_ticks(&self) -> u32 {
        self.grace_ticks
    }

    pub fn is_fatal(&self) -> bool {
        self.state == ReloadState::Fatal
    }

    /// Feeds this tick's reload flag. Called once per tick, never blocks.
    ///
    /// With a grace of `G` ticks, a trigger accepted on tick `t` returns
    /// [`ReloadStep::Proceed`] on tick `t + G`.
    pub fn observe(&mut self, flag: bool) -> ReloadStep {
        let rising = flag && !self.context.last_observed;
        self.context.last_observed = flag;

        match self.state {
            ReloadState::Idle if rising => {
                self.context.trigger_latched = true;
                self.context.grace_counter = self.grace_ticks;
                log::info!("reload requested, waiting {} ticks for the build", self.grace_ticks);
                if self.grace_ticks == 0 {
                    return ReloadStep::Proceed;
                }
                self.state = ReloadState::ArmedDelay {
                    remaining: self.grace_ticks,
                };
                ReloadStep::Wait
            }
            ReloadState::ArmedDelay { remaining } => {
                let remaining = remaining.saturating_sub(1);
                self.context.grace_counter = remaining;
                self.state = ReloadState::ArmedDelay { remaining };
                if remaining == 0 {
                    ReloadStep::Proceed
                } else {
                    ReloadStep::Wait
                }
            }
            _ => ReloadStep::Wait,
        }
    }

    pub fn begin_unload(&mut self) {
        self.state = ReloadState::Unloading;
    }

    pub fn begin_reload(&mut self) {
        self.state = ReloadState::Reloading;
    }

    /// Back to idle with the trigger cleared. The next flag comes from a new
    /// module instance, so a `true` seen on the following tick is a new request.
    pub fn complete(&mut self) {
        self.context.trigger_latched = false;
        self.context.last_observed = false;
        self.context.grace_counter = 0;
        self.state = ReloadState::Idle;
    }

    pub fn fail(&mut self) {
        self.state = ReloadState::Fatal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs a full reload the way the host does when the machine says so.
    fn drive(machine: &mut ReloadStateMachine, flag: bool) -> bool {
        match machine.observe(flag) {
            ReloadStep::Proceed => {
                machine.begin_unload();
                machine.begin_reload();
                machine.complete();
                true
            }
            ReloadStep::Wait => false,
        }
    }

    #[test]
    fn test_idle_without_flag() {
        let mut machine = ReloadStateMachine::new(3);
        for _ in 0..10 {
            assert_eq!(machine.observe(false), ReloadStep::Wait);
        }
        assert_eq!(machine.state(), ReloadState::Idle);
        assert!(!machine.context().trigger_latched);
    }

    #[test]
    fn test_grace_delay_bound() {
        let grace = 5;
        let mut machine = ReloadStateMachine::new(grace);
        assert_eq!(machine.observe(true), ReloadStep::Wait);
        assert_eq!(machine.state(), ReloadState::ArmedDelay { remaining: grace });
        assert!(machine.context().trigger_latched);

        for tick in 1..grace {
            assert_eq!(machine.observe(false), ReloadStep::Wait, "tick {tick}");
        }
        assert_eq!(machine.state(), ReloadState::ArmedDelay { remaining: 1 });
        assert_eq!(machine.observe(false), ReloadStep::Proceed);
    }

    #[test]
    fn test_flag_held_by_one_instance_reloads_once() {
        let mut machine = ReloadStateMachine::new(2);
        assert_eq!(machine.observe(true), ReloadStep::Wait);
        assert_eq!(machine.observe(true), ReloadStep::Wait);
        assert!(drive(&mut machine, true));
        assert_eq!(machine.state(), ReloadState::Idle);
        assert!(!machine.context().trigger_latched);
        assert!(!machine.context().last_observed);

        // the fresh instance keeps its flag down
        for _ in 0..10 {
            assert!(!drive(&mut machine, false));
        }
    }

    #[test]
    fn test_fresh_instance_can_request_on_first_tick() {
        let mut machine = ReloadStateMachine::new(1);
        assert!(!drive(&mut machine, true));
        assert!(drive(&mut machine, true));

        // the new instance raises its flag right away and holds it
        assert!(!drive(&mut machine, true));
        assert_eq!(machine.state(), ReloadState::ArmedDelay { remaining: 1 });
        assert!(drive(&mut machine, true));
        assert_eq!(machine.state(), ReloadState::Idle);
    }

    #[test]
    fn test_flag_during_grace_is_not_a_second_trigger() {
        let mut machine = ReloadStateMachine::new(4);
        machine.observe(true);
        machine.observe(false);
        machine.observe(true);
        assert_eq!(machine.state(), ReloadState::ArmedDelay { remaining: 2 });
        machine.observe(true);
        assert_eq!(machine.observe(true), ReloadStep::Proceed);
    }

    #[test]
    fn test_every_new_edge_reloads() {
        let mut machine = ReloadStateMachine::new(1);
        let mut reloads = 0;
        for _ in 0..4 {
            reloads += drive(&mut machine, true) as usize;
            reloads += drive(&mut machine, false) as usize;
            reloads += drive(&mut machine, false) as usize;
        }
        assert_eq!(reloads, 4);
    }

    #[test]
    fn test_zero_grace_proceeds_on_trigger_tick() {
        let mut machine = ReloadStateMachine::new(0);
        assert_eq!(machine.observe(true), ReloadStep::Proceed);
    }

    #[test]
    fn test_fatal_is_terminal() {
        let mut machine = ReloadStateMachine::new(0);
        assert_eq!(machine.observe(true), ReloadStep::Proceed);
        machine.begin_unload();
        machine.fail();
        assert!(machine.is_fatal());
        assert_eq!(machine.observe(false), ReloadStep::Wait);
        assert_eq!(machine.observe(true), ReloadStep::Wait);
        assert_eq!(machine.state(), ReloadState::Fatal);
    }
}
