// Licensed under the Apache-2.0 license

use log::debug;
use smlang::statemachine;

// Channel lifecycle. `Errored` is sticky: only a successful reset leaves it.
statemachine! {
    derive_states: [Clone, Copy, Debug],
    derive_events: [Clone, Copy, Debug],
    transitions: {
        // syntax: CurrentState Event = NextState
        *Halted + Started = Running,
        Running + Started = Running,

        Running + Stopped = Halted,
        Halted + Stopped = Halted,
        Errored + Stopped = Errored,

        // fatal interrupt or a handshake deadline miss
        _ + Fault = Errored,

        _ + ResetDone = Halted,
    }
}

pub(crate) struct Context;

impl StateMachineContext for Context {}

pub(crate) struct Lifecycle {
    sm: StateMachine<Context>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            sm: StateMachine::new(Context),
        }
    }

    pub(crate) fn state(&self) -> States {
        *self.sm.state()
    }

    pub(crate) fn is_errored(&self) -> bool {
        self.state() == States::Errored
    }

    pub(crate) fn on(&mut self, event: Events) -> States {
        let from = self.state();
        if self.sm.process_event(event).is_err() {
            debug!("vdma: {:?} ignored in state {:?}", event, from);
        }
        self.state()
    }
}
