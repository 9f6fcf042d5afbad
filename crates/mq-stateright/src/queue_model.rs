//! Monitor-level state machine of the bounded blocking queue.
//!
//! One action is one critical section. A thread that holds the lock
//! checks its predicate and then either completes its operation, finishes,
//! or parks in a wait set. Parked threads only move again when notified
//! (or spuriously woken), and a woken thread re-enters the monitor and
//! re-checks its predicate like any other attempt.
//!
//! A signal is part of the action that issues it. With
//! [`WakeMode::Single`] the action names the waiter that receives the
//! notification, so the checker explores every choice. A notification
//! sent while the wait set is empty is lost, as with a real condition
//! variable.
//!
//! # Properties
//!
//! Always:
//! 1. `bounded capacity`: never more than `capacity` items stored
//! 2. `fifo`: items leave in acceptance order and nothing is lost
//! 3. `no put after close`: nothing is accepted once closed
//! 4. `consumers finish only when closed and drained`
//! 5. `no stranded waiter`: never a state where every unfinished thread
//!    is parked
//!
//! Sometimes (reachability):
//! producer blocked on full, consumer blocked on empty, close while a
//! consumer waits, drained after close.

use std::collections::VecDeque;

use stateright::{Model, Property};

pub type ThreadId = usize;

pub const BOUNDED_CAPACITY: &str = "bounded capacity";
pub const FIFO: &str = "fifo";
pub const NO_PUT_AFTER_CLOSE: &str = "no put after close";
pub const CONSUMERS_FINISH_DRAINED: &str = "consumers finish only when closed and drained";
pub const NO_STRANDED_WAITER: &str = "no stranded waiter";
pub const PRODUCER_BLOCKED_ON_FULL: &str = "producer blocked on full";
pub const CONSUMER_BLOCKED_ON_EMPTY: &str = "consumer blocked on empty";
pub const CLOSE_WHILE_CONSUMER_WAITS: &str = "close while a consumer waits";
pub const DRAINED_AFTER_CLOSE: &str = "drained after close";

/// How `put` and `take` signal the opposite wait set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeMode {
    Single,
    Broadcast,
}

/// How `close` wakes parked threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseWake {
    All,
    /// BUG: close wakes nobody.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Index into the model's producer item lists.
    Producer(usize),
    Consumer,
    Closer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Ready,
    Waiting,
    /// Notified; has to re-acquire the lock and re-check.
    Woken,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitSet {
    NotFull,
    NotEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitorState {
    pub items: VecDeque<u64>,
    pub closed: bool,
    /// Every accepted item, in acceptance order.
    pub accepted: Vec<u64>,
    /// Every taken item, in removal order.
    pub taken: Vec<u64>,
    pub accepted_at_close: Option<usize>,
    pub phases: Vec<Phase>,
    /// Per thread; index of the next item a producer will put.
    pub next_item: Vec<usize>,
    pub closed_while_consumer_waited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueAction {
    Put { thread: ThreadId, wake: Option<ThreadId> },
    Take { thread: ThreadId, wake: Option<ThreadId> },
    Close { thread: ThreadId },
    SpuriousWake { thread: ThreadId },
}

impl QueueAction {
    pub fn thread(&self) -> ThreadId {
        match *self {
            QueueAction::Put { thread, .. }
            | QueueAction::Take { thread, .. }
            | QueueAction::Close { thread }
            | QueueAction::SpuriousWake { thread } => thread,
        }
    }
}

/// What an action does, as the calling thread observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    Accepted(u64),
    /// The thread parks in a wait set.
    Blocked,
    Refused,
    Took(u64),
    Drained,
    Closed,
    Woken,
}

#[derive(Debug, Clone)]
pub struct QueueModel {
    pub capacity: usize,
    pub producers: Vec<Vec<u64>>,
    pub consumers: usize,
    pub wake_mode: WakeMode,
    pub close_wake: CloseWake,
    pub spurious_wakeups: bool,
    roles: Vec<Role>,
}

impl QueueModel {
    /// Producers, then consumers, then one closer.
    pub fn new(capacity: usize, producers: Vec<Vec<u64>>, consumers: usize) -> Self {
        debug_assert!(capacity > 0, "capacity must be positive");
        let roles = (0..producers.len())
            .map(Role::Producer)
            .chain(std::iter::repeat(Role::Consumer).take(consumers))
            .chain(std::iter::once(Role::Closer))
            .collect();
        Self {
            capacity,
            producers,
            consumers,
            wake_mode: WakeMode::Single,
            close_wake: CloseWake::All,
            spurious_wakeups: false,
            roles,
        }
    }

    pub fn with_wake_mode(mut self, wake_mode: WakeMode) -> Self {
        self.wake_mode = wake_mode;
        self
    }

    pub fn with_close_wake(mut self, close_wake: CloseWake) -> Self {
        self.close_wake = close_wake;
        self
    }

    pub fn with_spurious_wakeups(mut self, enabled: bool) -> Self {
        self.spurious_wakeups = enabled;
        self
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn threads_count(&self) -> usize {
        self.roles.len()
    }

    pub fn initial_state(&self) -> MonitorState {
        let phases = self
            .roles
            .iter()
            .map(|role| match role {
                Role::Producer(p) if self.producers[*p].is_empty() => Phase::Finished,
                _ => Phase::Ready,
            })
            .collect();
        MonitorState {
            items: VecDeque::new(),
            closed: false,
            accepted: Vec::new(),
            taken: Vec::new(),
            accepted_at_close: None,
            phases,
            next_item: vec![0; self.roles.len()],
            closed_while_consumer_waited: false,
        }
    }

    fn wait_set(&self, thread: ThreadId) -> Option<WaitSet> {
        match self.roles[thread] {
            Role::Producer(_) => Some(WaitSet::NotFull),
            Role::Consumer => Some(WaitSet::NotEmpty),
            Role::Closer => None,
        }
    }

    /// Threads currently parked in `set`.
    pub fn waiters(&self, state: &MonitorState, set: WaitSet) -> Vec<ThreadId> {
        (0..self.roles.len())
            .filter(|&t| state.phases[t] == Phase::Waiting && self.wait_set(t) == Some(set))
            .collect()
    }

    fn pending_item(&self, state: &MonitorState, thread: ThreadId) -> Option<u64> {
        match self.roles[thread] {
            Role::Producer(p) => self.producers[p].get(state.next_item[thread]).copied(),
            _ => None,
        }
    }

    fn can_enter(&self, state: &MonitorState, thread: ThreadId) -> bool {
        matches!(state.phases[thread], Phase::Ready | Phase::Woken)
    }

    /// The outcome `action` would have in `state`, or `None` when the
    /// action is not enabled there.
    pub fn outcome(&self, state: &MonitorState, action: &QueueAction) -> Option<StepOutcome> {
        let thread = action.thread();
        if thread >= self.roles.len() {
            return None;
        }
        match *action {
            QueueAction::Put { .. } => {
                let item = self.pending_item(state, thread)?;
                if !self.can_enter(state, thread) {
                    None
                } else if state.closed {
                    Some(StepOutcome::Refused)
                } else if state.items.len() >= self.capacity {
                    Some(StepOutcome::Blocked)
                } else {
                    Some(StepOutcome::Accepted(item))
                }
            }
            QueueAction::Take { .. } => {
                if self.roles[thread] != Role::Consumer || !self.can_enter(state, thread) {
                    None
                } else if let Some(&item) = state.items.front() {
                    Some(StepOutcome::Took(item))
                } else if state.closed {
                    Some(StepOutcome::Drained)
                } else {
                    Some(StepOutcome::Blocked)
                }
            }
            QueueAction::Close { .. } => {
                (self.roles[thread] == Role::Closer && state.phases[thread] == Phase::Ready)
                    .then_some(StepOutcome::Closed)
            }
            QueueAction::SpuriousWake { .. } => {
                (self.spurious_wakeups && state.phases[thread] == Phase::Waiting).then_some(StepOutcome::Woken)
            }
        }
    }

    /// One action per possible recipient of a single-waiter signal to `set`.
    fn with_wake_choices(
        &self,
        state: &MonitorState,
        set: WaitSet,
        make: impl Fn(Option<ThreadId>) -> QueueAction,
        actions: &mut Vec<QueueAction>,
    ) {
        let waiters = self.waiters(state, set);
        if self.wake_mode == WakeMode::Broadcast || waiters.is_empty() {
            actions.push(make(None));
        } else {
            actions.extend(waiters.into_iter().map(|w| make(Some(w))));
        }
    }

    fn signal(&self, state: &mut MonitorState, set: WaitSet, wake: Option<ThreadId>) {
        match self.wake_mode {
            WakeMode::Single => {
                if let Some(w) = wake {
                    if state.phases[w] == Phase::Waiting {
                        state.phases[w] = Phase::Woken;
                    }
                }
            }
            WakeMode::Broadcast => {
                for w in self.waiters(state, set) {
                    state.phases[w] = Phase::Woken;
                }
            }
        }
    }

    fn consumers_in<'a>(&'a self, state: &'a MonitorState, phase: Phase) -> impl Iterator<Item = ThreadId> + 'a {
        (0..self.roles.len()).filter(move |&t| self.roles[t] == Role::Consumer && state.phases[t] == phase)
    }

    /// Every unfinished thread is parked.
    pub fn is_stranded(&self, state: &MonitorState) -> bool {
        let mut unfinished = state.phases.iter().filter(|p| **p != Phase::Finished).peekable();
        unfinished.peek().is_some() && unfinished.all(|p| *p == Phase::Waiting)
    }

    pub fn is_fifo(&self, state: &MonitorState) -> bool {
        let taken = state.taken.len();
        taken + state.items.len() == state.accepted.len()
            && state.accepted[..taken] == state.taken[..]
            && state.items.iter().eq(state.accepted[taken..].iter())
    }
}

impl Model for QueueModel {
    type State = MonitorState;
    type Action = QueueAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![self.initial_state()]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for thread in 0..self.roles.len() {
            let put = QueueAction::Put { thread, wake: None };
            let take = QueueAction::Take { thread, wake: None };
            match self.roles[thread] {
                Role::Producer(_) => match self.outcome(state, &put) {
                    Some(StepOutcome::Accepted(_)) => self.with_wake_choices(
                        state,
                        WaitSet::NotEmpty,
                        |wake| QueueAction::Put { thread, wake },
                        actions,
                    ),
                    Some(_) => actions.push(put),
                    None => {}
                },
                Role::Consumer => match self.outcome(state, &take) {
                    Some(StepOutcome::Took(_)) => self.with_wake_choices(
                        state,
                        WaitSet::NotFull,
                        |wake| QueueAction::Take { thread, wake },
                        actions,
                    ),
                    Some(_) => actions.push(take),
                    None => {}
                },
                Role::Closer => {
                    let close = QueueAction::Close { thread };
                    if self.outcome(state, &close).is_some() {
                        actions.push(close);
                    }
                }
            }
            let spurious = QueueAction::SpuriousWake { thread };
            if self.outcome(state, &spurious).is_some() {
                actions.push(spurious);
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let outcome = self.outcome(last_state, &action)?;
        let thread = action.thread();
        let mut next = last_state.clone();

        match (action, outcome) {
            (_, StepOutcome::Blocked) => next.phases[thread] = Phase::Waiting,
            (_, StepOutcome::Refused) | (_, StepOutcome::Drained) => next.phases[thread] = Phase::Finished,
            (QueueAction::Put { wake, .. }, StepOutcome::Accepted(item)) => {
                next.items.push_back(item);
                next.accepted.push(item);
                next.next_item[thread] += 1;
                next.phases[thread] = if self.pending_item(&next, thread).is_some() {
                    Phase::Ready
                } else {
                    Phase::Finished
                };
                self.signal(&mut next, WaitSet::NotEmpty, wake);
            }
            (QueueAction::Take { wake, .. }, StepOutcome::Took(item)) => {
                next.items.pop_front();
                next.taken.push(item);
                next.phases[thread] = Phase::Ready;
                self.signal(&mut next, WaitSet::NotFull, wake);
            }
            (QueueAction::Close { .. }, StepOutcome::Closed) => {
                next.closed = true;
                next.accepted_at_close = Some(next.accepted.len());
                let consumer_waiting = self.consumers_in(&next, Phase::Waiting).next().is_some();
                next.closed_while_consumer_waited = consumer_waiting;
                if self.close_wake == CloseWake::All {
                    for phase in next.phases.iter_mut().filter(|p| **p == Phase::Waiting) {
                        *phase = Phase::Woken;
                    }
                }
                next.phases[thread] = Phase::Finished;
            }
            (QueueAction::SpuriousWake { .. }, StepOutcome::Woken) => next.phases[thread] = Phase::Woken,
            _ => return None,
        }
        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always(BOUNDED_CAPACITY, |model: &QueueModel, state: &MonitorState| {
                state.items.len() <= model.capacity
            }),
            Property::always(FIFO, |model: &QueueModel, state: &MonitorState| model.is_fifo(state)),
            Property::always(NO_PUT_AFTER_CLOSE, |_: &QueueModel, state: &MonitorState| {
                state.accepted_at_close.map_or(true, |n| state.accepted.len() == n)
            }),
            Property::always(CONSUMERS_FINISH_DRAINED, |model: &QueueModel, state: &MonitorState| {
                model.consumers_in(state, Phase::Finished).next().is_none()
                    || (state.closed && state.items.is_empty())
            }),
            Property::always(NO_STRANDED_WAITER, |model: &QueueModel, state: &MonitorState| {
                !model.is_stranded(state)
            }),
            Property::sometimes(PRODUCER_BLOCKED_ON_FULL, |model: &QueueModel, state: &MonitorState| {
                !model.waiters(state, WaitSet::NotFull).is_empty()
            }),
            Property::sometimes(CONSUMER_BLOCKED_ON_EMPTY, |model: &QueueModel, state: &MonitorState| {
                !model.waiters(state, WaitSet::NotEmpty).is_empty()
            }),
            Property::sometimes(CLOSE_WHILE_CONSUMER_WAITS, |_: &QueueModel, state: &MonitorState| {
                state.closed_while_consumer_waited
            }),
            Property::sometimes(DRAINED_AFTER_CLOSE, |model: &QueueModel, state: &MonitorState| {
                state.closed
                    && !state.accepted.is_empty()
                    && model.consumers_in(state, Phase::Finished).count() == model.consumers
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use stateright::Checker;

    use super::*;

    fn small_model() -> QueueModel {
        QueueModel::new(1, vec![vec![1, 2], vec![3]], 2)
    }

    fn apply(model: &QueueModel, state: &MonitorState, action: QueueAction) -> MonitorState {
        model.next_state(state, action).unwrap()
    }

    #[test]
    fn test_initial_state() {
        let model = QueueModel::new(2, vec![vec![1], vec![]], 1);
        let state = model.initial_state();
        assert_eq!(model.threads_count(), 4);
        assert_eq!(state.phases, vec![Phase::Ready, Phase::Finished, Phase::Ready, Phase::Ready]);
        assert!(model.is_fifo(&state));
        assert!(!model.is_stranded(&state));
    }

    #[test]
    fn test_handoff_through_full() {
        let model = QueueModel::new(1, vec![vec![1, 2]], 1);
        let (producer, consumer) = (0, 1);
        let mut state = model.initial_state();

        state = apply(&model, &state, QueueAction::Put { thread: producer, wake: None });
        let blocked = QueueAction::Put { thread: producer, wake: None };
        assert_eq!(model.outcome(&state, &blocked), Some(StepOutcome::Blocked));
        state = apply(&model, &state, blocked);
        assert_eq!(model.waiters(&state, WaitSet::NotFull), vec![producer]);

        state = apply(&model, &state, QueueAction::Take { thread: consumer, wake: Some(producer) });
        assert_eq!(state.phases[producer], Phase::Woken);
        state = apply(&model, &state, QueueAction::Put { thread: producer, wake: None });
        assert_eq!(state.phases[producer], Phase::Finished);
        assert_eq!(state.items, VecDeque::from(vec![2]));
        assert!(model.is_fifo(&state));
    }

    #[test]
    fn test_close_wakes_every_waiter() {
        let model = QueueModel::new(1, vec![], 2);
        let mut state = model.initial_state();
        state = apply(&model, &state, QueueAction::Take { thread: 0, wake: None });
        state = apply(&model, &state, QueueAction::Take { thread: 1, wake: None });
        assert!(!model.is_stranded(&state));

        state = apply(&model, &state, QueueAction::Close { thread: 2 });
        assert!(state.closed_while_consumer_waited);
        assert_eq!(state.phases[..2], [Phase::Woken, Phase::Woken]);
        assert_eq!(
            model.outcome(&state, &QueueAction::Take { thread: 0, wake: None }),
            Some(StepOutcome::Drained)
        );
    }

    #[test]
    fn test_close_without_wake_strands_consumer() {
        let model = QueueModel::new(1, vec![], 1).with_close_wake(CloseWake::None);
        let mut state = model.initial_state();
        state = apply(&model, &state, QueueAction::Take { thread: 0, wake: None });
        state = apply(&model, &state, QueueAction::Close { thread: 1 });
        assert!(model.is_stranded(&state));
    }

    #[test]
    fn test_disabled_actions() {
        let model = small_model();
        let state = model.initial_state();
        assert_eq!(model.outcome(&state, &QueueAction::Take { thread: 0, wake: None }), None);
        assert_eq!(model.outcome(&state, &QueueAction::Close { thread: 0 }), None);
        assert_eq!(model.outcome(&state, &QueueAction::SpuriousWake { thread: 2 }), None);
        assert!(model.next_state(&state, QueueAction::Put { thread: 9, wake: None }).is_none());
    }

    #[test]
    fn test_stateright_single_wake_holds() {
        let checker = small_model().checker().spawn_bfs().join();
        checker.assert_properties();
        assert!(checker.unique_state_count() > 10);
    }

    #[test]
    fn test_stateright_broadcast_with_spurious_wakeups_holds() {
        let model = small_model()
            .with_wake_mode(WakeMode::Broadcast)
            .with_spurious_wakeups(true);
        model.checker().spawn_bfs().join().assert_properties();
    }

    #[test]
    fn test_stateright_single_wake_with_spurious_wakeups_holds() {
        let model = QueueModel::new(2, vec![vec![1, 2], vec![3, 4]], 2).with_spurious_wakeups(true);
        model.checker().spawn_bfs().join().assert_properties();
    }

    #[test]
    fn test_stateright_finds_close_without_wake() {
        let checker = small_model()
            .with_close_wake(CloseWake::None)
            .checker()
            .spawn_bfs()
            .join();
        checker.assert_any_discovery(NO_STRANDED_WAITER);
        checker.assert_no_discovery(FIFO);
        checker.assert_no_discovery(BOUNDED_CAPACITY);
    }
}
