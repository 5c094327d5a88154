use serde::{Deserialize, Serialize};

use crate::game::Action;

/// A single step of experience, consumed by the Bellman update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition<S> {
    pub state: S,
    pub action: Action,
    pub reward: f64,
    pub next_state: S,
    pub done: bool,
}

/// Interface shared by every player the episode runner can seat.
pub trait Policy<S> {
    /// Choose one of `legal` for `state`. When `explore` is false the choice
    /// must be a pure exploitation of what the policy knows.
    ///
    /// Returns `None` only when `legal` is empty.
    fn select_action(&mut self, state: &S, legal: &[Action], explore: bool) -> Option<Action>;

    /// Return the policy's display name.
    fn name(&self) -> &str;
}

impl<S, P: Policy<S> + ?Sized> Policy<S> for &mut P {
    fn select_action(&mut self, state: &S, legal: &[Action], explore: bool) -> Option<Action> {
        (**self).select_action(state, legal, explore)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<S, P: Policy<S> + ?Sized> Policy<S> for Box<P> {
    fn select_action(&mut self, state: &S, legal: &[Action], explore: bool) -> Option<Action> {
        (**self).select_action(state, legal, explore)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
