//! Turn scheduler
//!
//! One scheduler drives one machine. It owns the player queue, the command
//! queue and the live round, and races round timers against hardware events.
//!
//! Every timer and hardware continuation carries a [`RoundToken`]. Compare and
//! transition happen in a single critical section, so whichever continuation
//! reaches a live round first wins and the rest observe a stale token and do
//! nothing.
//!
//! Cancellation has two tiers. The binding token lives as long as the
//! machine binding (event pump, resets, reconnects). The session token is a
//! child of it, replaced on every mode switch or reset, and scopes round
//! timers and the drain loop.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSettings;
use crate::hardware::{MachineControl, MachineEvent};
use crate::modes::{
    CompletionSignal, Decoded, GameModePolicy, JoinDecision, JoinRequest, MessageContext,
};
use crate::notify::{Alert, AlertSink};
use crate::queue::{command_queue, CommandQueue, PlayerQueue};

use super::{
    Availability, Command, CommandRejected, GameMode, RecoveryDecision, RecoveryPolicy,
    RemovalReason, Round, RoundPhase, RoundToken, SchedulerEvent, TurnEndReason,
};

/// Result of an accepted chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submitted {
    Queued { commands: usize, pending: usize },
    Gifted { to: String },
    /// Plain chat, nothing to do
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinOutcome {
    pub identity: String,
    pub position: usize,
    pub already_queued: bool,
}

/// Point-in-time view of one machine
#[derive(Debug, Clone, Serialize)]
pub struct MachineStatus {
    pub machine: String,
    pub mode: GameMode,
    pub availability: Availability,
    pub phase: RoundPhase,
    pub generation: u64,
    pub current_player: Option<String>,
    /// Milliseconds into the live round
    pub round_elapsed_ms: Option<u64>,
    pub players: Vec<String>,
    pub pending_commands: usize,
    pub input_locked: bool,
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

struct SchedulerState {
    policy: Arc<dyn GameModePolicy>,
    players: PlayerQueue,
    commands: CommandQueue,
    round: Round,
    generation: u64,
    availability: Availability,
    recovery: RecoveryPolicy,
    latency_ms: Option<u64>,
    session: CancellationToken,
}

impl SchedulerState {
    fn live_token(&self) -> Option<RoundToken> {
        self.round
            .token()
            .filter(|t| self.round.is_live(t))
            .cloned()
    }
}

/// Work decided under the lock and carried out after it is released
#[derive(Default)]
struct Effects {
    events: Vec<SchedulerEvent>,
    timers: Vec<(RoundToken, CancellationToken)>,
    drain: Option<CancellationToken>,
    alerts: Vec<Alert>,
    reset_after: Option<Duration>,
    reconnect: bool,
}

pub struct TurnScheduler {
    name: String,
    machine: Arc<dyn MachineControl>,
    settings: SchedulerSettings,
    state: Mutex<SchedulerState>,
    events: broadcast::Sender<SchedulerEvent>,
    binding: CancellationToken,
    alerts: Arc<dyn AlertSink>,
}

impl TurnScheduler {
    /// Bind a scheduler to a machine and start consuming its events. The
    /// subscription is released when the scheduler shuts down or is dropped.
    pub fn bind(
        machine: Arc<dyn MachineControl>,
        policy: Arc<dyn GameModePolicy>,
        settings: SchedulerSettings,
        alerts: Arc<dyn AlertSink>,
    ) -> Arc<Self> {
        let binding = CancellationToken::new();
        let (events, _) = broadcast::channel(256);
        let machine_events = machine.subscribe();

        let state = SchedulerState {
            policy,
            players: PlayerQueue::new(settings.max_queue_size, settings.case_sensitive_identities),
            commands: CommandQueue::new(),
            round: Round::idle(),
            generation: 0,
            availability: Availability::Online,
            recovery: RecoveryPolicy::new(settings.max_reset_attempts, settings.reset_delay),
            latency_ms: None,
            session: binding.child_token(),
        };

        let scheduler = Arc::new(Self {
            name: machine.name().to_string(),
            machine,
            settings,
            state: Mutex::new(state),
            events,
            binding,
            alerts,
        });
        scheduler.spawn_event_pump(machine_events);

        info!(machine = %scheduler.name, mode = %scheduler.mode(), "Turn scheduler bound");
        scheduler
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn machine(&self) -> &Arc<dyn MachineControl> {
        &self.machine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn policy(&self) -> Arc<dyn GameModePolicy> {
        self.state.lock().policy.clone()
    }

    pub fn mode(&self) -> GameMode {
        self.state.lock().policy.mode()
    }

    /// Token of the live round, if any
    pub fn current_token(&self) -> Option<RoundToken> {
        self.state.lock().live_token()
    }

    pub fn status(&self) -> MachineStatus {
        let state = self.state.lock();
        let snapshot = state.players.snapshot();
        MachineStatus {
            machine: self.name.clone(),
            mode: state.policy.mode(),
            availability: state.availability,
            phase: state.round.phase(),
            generation: state.generation,
            current_player: snapshot.current,
            round_elapsed_ms: state.round.elapsed().map(|d| d.as_millis() as u64),
            players: snapshot.players,
            pending_commands: state.commands.len(),
            input_locked: state.commands.is_input_locked(),
            connected: self.machine.is_connected(),
            latency_ms: state.latency_ms,
        }
    }

    /// Stop every task tied to this binding
    pub fn shutdown(&self) {
        self.binding.cancel();
        info!(machine = %self.name, "Turn scheduler shut down");
    }

    // ----- public operations -----

    /// Start a round for `player`, or reset the mode when `None`. Returns the
    /// new round token when a round actually started.
    pub fn start_round(self: &Arc<Self>, player: Option<&str>) -> Option<RoundToken> {
        self.transition(|this, state, fx| {
            this.start_round_locked(state, fx, player);
            state.live_token()
        })
    }

    /// End the round named by `token` and advance the queue. Only the first
    /// call for a token has any effect.
    pub fn end_turn(self: &Arc<Self>, token: &RoundToken, reason: TurnEndReason) -> bool {
        self.transition(|this, state, fx| {
            if !this.end_turn_locked(state, fx, token, reason) {
                return false;
            }
            this.advance_locked(state, fx);
            true
        })
    }

    /// Decode a chat message with the active mode and act on it
    pub fn submit_message(
        self: &Arc<Self>,
        sender: &str,
        text: &str,
    ) -> Result<Submitted, CommandRejected> {
        let policy = self.policy();
        let participant = policy.participant_for(sender);
        let ctx = MessageContext {
            participant: &participant,
            machine: &self.name,
            move_duration: self.settings.move_duration,
            short_move_duration: self.settings.short_move_duration,
        };

        let result = match policy.decode_message(&ctx, text) {
            Decoded::NotACommand => return Ok(Submitted::Ignored),
            Decoded::Rejected(reason) => Err(CommandRejected::Invalid(reason)),
            Decoded::GiftTurn(to) => self.gift_turn_inner(sender, &to),
            Decoded::Commands(cmds) => self.enqueue_for(&participant, cmds, false),
            Decoded::Group(cmds) => self.enqueue_for(&participant, cmds, true),
        };
        self.report(sender, result)
    }

    /// Queue already decoded commands on behalf of `sender`
    pub fn submit_commands(
        self: &Arc<Self>,
        sender: &str,
        commands: Vec<Command>,
    ) -> Result<Submitted, CommandRejected> {
        let participant = self.policy().participant_for(sender);
        let result = self.enqueue_for(&participant, commands, false);
        self.report(sender, result)
    }

    /// Hand the live turn from `from` to `to`
    pub fn gift_turn(self: &Arc<Self>, from: &str, to: &str) -> Result<Submitted, CommandRejected> {
        let result = self.gift_turn_inner(from, to);
        self.report(from, result)
    }

    pub fn join(self: &Arc<Self>, request: JoinRequest) -> Result<JoinOutcome, CommandRejected> {
        let identity = match self.policy().join_rule(&request) {
            JoinDecision::Allowed { identity } => identity,
            JoinDecision::Denied(reason) => {
                debug!(machine = %self.name, sender = %request.sender, %reason, "Join denied");
                return Err(CommandRejected::JoinDenied(reason));
            }
        };

        self.transition(|this, state, fx| {
            if state.availability == Availability::OutOfRotation {
                return Err(CommandRejected::MachineUnavailable);
            }

            let already_queued = state.players.contains(&identity);
            let position = state
                .players
                .add_single_player(&identity)
                .map_err(|_| CommandRejected::QueueFull)?;

            if !already_queued {
                info!(machine = %this.name, player = %identity, position, "Player joined");
                fx.events.push(SchedulerEvent::PlayerJoined {
                    machine: this.name.clone(),
                    player: identity.clone(),
                    position,
                });
            }

            if !state.round.is_running() && state.players.len() >= state.policy.minimum_players() {
                if let Some(current) = state.players.current_player().map(str::to_string) {
                    this.start_round_locked(state, fx, Some(&current));
                }
            }

            Ok(JoinOutcome {
                identity,
                position,
                already_queued,
            })
        })
    }

    pub fn leave(self: &Arc<Self>, sender: &str) -> Result<(), CommandRejected> {
        self.transition(|this, state, fx| {
            if !state.players.contains(sender) {
                return Err(CommandRejected::NotQueued(sender.to_string()));
            }

            let holding = state
                .live_token()
                .filter(|t| state.players.same_identity(&t.player, sender));

            state.players.remove_single_player(sender);
            info!(machine = %this.name, player = %sender, "Player left");
            fx.events.push(SchedulerEvent::PlayerRemoved {
                machine: this.name.clone(),
                player: sender.to_string(),
                reason: RemovalReason::Left,
            });

            if let Some(token) = holding {
                if this.end_turn_locked(state, fx, &token, TurnEndReason::PlayerLeft) {
                    this.advance_locked(state, fx);
                }
            }
            Ok(())
        })
    }

    /// Switch game mode. Cancels every timer of the old session and starts
    /// from an empty queue.
    pub fn set_mode(self: &Arc<Self>, policy: Arc<dyn GameModePolicy>) {
        self.transition(|this, state, fx| {
            state.session.cancel();
            state.session = this.binding.child_token();

            let mode = policy.mode();
            state.policy = policy;
            state.players = PlayerQueue::new(
                this.settings.max_queue_size,
                this.settings.case_sensitive_identities,
            );
            state.commands = CommandQueue::new();
            state.generation += 1;
            state.round = Round::idle();

            info!(machine = %this.name, %mode, "Game mode changed");
            fx.events.push(SchedulerEvent::ModeChanged {
                machine: this.name.clone(),
                mode,
            });
        });
    }

    /// Operator restore: return the machine to rotation with a clean session
    pub fn restore(self: &Arc<Self>) {
        self.transition(|this, state, fx| this.reset_mode_locked(state, fx));
    }

    // ----- timer continuations -----

    /// Grace window expiry for `token`. Returns true if the player was
    /// removed as AFK.
    pub fn handle_grace_expiry(self: &Arc<Self>, token: &RoundToken) -> bool {
        self.transition(|this, state, fx| {
            if !state.round.is_live(token) {
                debug!(machine = %this.name, generation = token.generation, "Stale grace timer");
                return false;
            }
            if state.availability != Availability::Online {
                return false;
            }
            // a sole participant keeps the full round
            if state.round.has_acted() || state.players.len() <= 1 {
                return false;
            }

            info!(machine = %this.name, player = %token.player, generation = token.generation, "Player AFK, removing");
            state.players.remove_single_player(&token.player);
            fx.events.push(SchedulerEvent::PlayerRemoved {
                machine: this.name.clone(),
                player: token.player.clone(),
                reason: RemovalReason::Afk,
            });
            this.end_turn_locked(state, fx, token, TurnEndReason::Afk);
            this.advance_locked(state, fx);
            true
        })
    }

    /// Hard duration expiry for `token`. Defers to the hardware while a
    /// destructive action is in flight. Returns true if the turn ended.
    pub fn handle_hard_expiry(self: &Arc<Self>, token: &RoundToken) -> bool {
        self.transition(|this, state, fx| {
            if !state.round.is_live(token) {
                debug!(machine = %this.name, generation = token.generation, "Stale round timer");
                return false;
            }
            if state.availability != Availability::Online {
                return false;
            }
            if this.machine.is_play_active() {
                debug!(machine = %this.name, player = %token.player, "Play active, waiting on hardware");
                return false;
            }

            let acted = state.round.has_acted();
            this.end_turn_locked(state, fx, token, TurnEndReason::TimeExpired);
            if !acted && state.players.remove_single_player(&token.player) {
                fx.events.push(SchedulerEvent::PlayerRemoved {
                    machine: this.name.clone(),
                    player: token.player.clone(),
                    reason: RemovalReason::Afk,
                });
            }
            this.advance_locked(state, fx);
            true
        })
    }

    // ----- hardware events -----

    pub fn handle_machine_event(self: &Arc<Self>, event: MachineEvent) {
        match event {
            MachineEvent::ReturnedHome | MachineEvent::Recoiled => {
                let signal = if event == MachineEvent::ReturnedHome {
                    CompletionSignal::ReturnedHome
                } else {
                    CompletionSignal::Recoiled
                };
                self.transition(|this, state, fx| {
                    if signal == CompletionSignal::ReturnedHome {
                        state.recovery.reset();
                    }
                    if state.policy.completion_signal() == signal {
                        this.complete_dropping_locked(state, fx);
                    }
                });
            }
            MachineEvent::ReturnedCenter => {
                let mut state = self.state.lock();
                state.commands.unlock_input();
                state.recovery.reset();
            }
            MachineEvent::MotorTimeout { direction } => {
                self.transition(|this, state, fx| this.on_motor_timeout(state, fx, &direction.to_string()));
            }
            MachineEvent::ClawTimeout => {
                warn!(machine = %self.name, "Claw timed out");
                self.transition(|this, _, fx| {
                    fx.alerts.push(Alert::warning(&this.name, "Claw timed out"));
                });
            }
            MachineEvent::ResetButtonPressed => {
                info!(machine = %self.name, "Reset button pressed");
                self.transition(|this, state, fx| this.reset_mode_locked(state, fx));
            }
            MachineEvent::ChuteSensorTripped { belt } => {
                self.transition(|this, state, fx| {
                    let player = state.live_token().map(|t| t.player);
                    info!(machine = %this.name, belt, player = ?player, "Chute sensor tripped");
                    fx.events.push(SchedulerEvent::ChuteSensorTripped {
                        machine: this.name.clone(),
                        belt,
                        player,
                    });
                });
            }
            MachineEvent::PingSuccess { latency_ms } => {
                self.state.lock().latency_ms = Some(latency_ms);
            }
            MachineEvent::PingTimeout | MachineEvent::Disconnected => {
                self.transition(|this, state, fx| {
                    if state.availability != Availability::Online {
                        return;
                    }
                    warn!(machine = %this.name, "Lost connection to machine, reconnecting");
                    state.availability = Availability::Reconnecting;
                    fx.reconnect = true;
                });
            }
            MachineEvent::Dropping => debug!(machine = %self.name, "Claw dropping"),
            MachineEvent::Info { message } => debug!(machine = %self.name, %message, "Controller info"),
        }
    }

    // ----- locked helpers -----

    fn start_round_locked(&self, state: &mut SchedulerState, fx: &mut Effects, player: Option<&str>) {
        state.generation += 1;
        let generation = state.generation;
        let mode = state.policy.mode();

        let Some(player) = player else {
            state.players.clear();
            state.commands.clear();
            state.round = Round::idle();
            state.policy.on_round_started(None);
            info!(machine = %self.name, generation, "Mode reset");
            fx.events.push(SchedulerEvent::RoundStarted {
                machine: self.name.clone(),
                player: None,
                generation,
                mode,
            });
            return;
        };

        if state.availability != Availability::Online
            || state.players.len() < state.policy.minimum_players()
            || state.players.select_player(player).is_err()
        {
            debug!(machine = %self.name, %player, "Round not started");
            state.round = Round::idle();
            return;
        }

        let identity = state.players.current_player().unwrap_or(player).to_string();
        state.commands.clear_pending();
        let token = RoundToken::new(generation, identity.clone());
        state.round = Round::start(token.clone());
        state.policy.on_round_started(Some(&identity));

        info!(machine = %self.name, player = %identity, generation, "Round started");
        fx.timers.push((token, state.session.clone()));
        fx.events.push(SchedulerEvent::RoundStarted {
            machine: self.name.clone(),
            player: Some(identity),
            generation,
            mode,
        });
    }

    fn end_turn_locked(
        &self,
        state: &mut SchedulerState,
        fx: &mut Effects,
        token: &RoundToken,
        reason: TurnEndReason,
    ) -> bool {
        if !state.round.end(token) {
            debug!(machine = %self.name, generation = token.generation, ?reason, "Turn already ended");
            return false;
        }

        info!(machine = %self.name, player = %token.player, generation = token.generation, ?reason, "Turn ended");
        state.policy.on_turn_ended(&token.player, reason);
        fx.events.push(SchedulerEvent::TurnEnded {
            machine: self.name.clone(),
            player: token.player.clone(),
            generation: token.generation,
            mode: state.policy.mode(),
            reason,
        });

        if state.policy.remove_after_turn() && state.players.remove_single_player(&token.player) {
            fx.events.push(SchedulerEvent::PlayerRemoved {
                machine: self.name.clone(),
                player: token.player.clone(),
                reason: RemovalReason::TurnUsed,
            });
        }
        true
    }

    fn advance_locked(&self, state: &mut SchedulerState, fx: &mut Effects) {
        let next = state.players.get_next_player();
        self.start_round_locked(state, fx, next.as_deref());
    }

    /// End the turn that issued the in-flight destructive action, if it is
    /// still live
    fn complete_dropping_locked(&self, state: &mut SchedulerState, fx: &mut Effects) -> bool {
        let Some(token) = state.round.dropping().cloned() else {
            return false;
        };
        if !self.end_turn_locked(state, fx, &token, TurnEndReason::Completed) {
            return false;
        }
        self.advance_locked(state, fx);
        true
    }

    fn reset_mode_locked(&self, state: &mut SchedulerState, fx: &mut Effects) {
        state.session.cancel();
        state.session = self.binding.child_token();
        state.commands = CommandQueue::new();
        state.recovery.reset();
        state.availability = Availability::Online;
        self.start_round_locked(state, fx, None);

        info!(machine = %self.name, "Machine restored");
        fx.events.push(SchedulerEvent::MachineRestored {
            machine: self.name.clone(),
        });
    }

    fn on_motor_timeout(&self, state: &mut SchedulerState, fx: &mut Effects, direction: &str) {
        if state.availability == Availability::OutOfRotation {
            return;
        }

        match state.recovery.on_timeout() {
            RecoveryDecision::Retry { attempt, delay } => {
                warn!(machine = %self.name, %direction, attempt, "Motor timeout, scheduling reset");
                fx.reset_after = Some(delay);
            }
            RecoveryDecision::Exhausted { attempts } => {
                error!(machine = %self.name, %direction, attempts, "Recovery exhausted, taking machine out of rotation");
                state.availability = Availability::OutOfRotation;
                if let Some(token) = state.live_token() {
                    self.end_turn_locked(state, fx, &token, TurnEndReason::MachineFault);
                }
                state.round = Round::idle();
                state.commands.clear();
                state.commands.lock_input();

                let reason = format!("Motor timeout ({}) after {} resets", direction, attempts);
                fx.alerts.push(Alert::fatal(&self.name, reason.clone()));
                fx.events.push(SchedulerEvent::MachineUnavailable {
                    machine: self.name.clone(),
                    reason,
                });
            }
        }
    }

    // ----- internals -----

    /// Run `f` under the machine lock, publish its events in order, then
    /// carry out the remaining effects outside the lock
    fn transition<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&Self, &mut SchedulerState, &mut Effects) -> R,
    ) -> R {
        let this: &Self = self;
        let mut fx = Effects::default();
        let result = {
            let mut state = this.state.lock();
            let result = f(this, &mut state, &mut fx);
            for event in fx.events.drain(..) {
                let _ = self.events.send(event);
            }
            result
        };
        self.apply(fx);
        result
    }

    fn apply(self: &Arc<Self>, fx: Effects) {
        for (token, session) in fx.timers {
            self.spawn_round_timer(token, session);
        }
        if let Some(session) = fx.drain {
            self.spawn_drain(session);
        }
        for alert in fx.alerts {
            let sink = self.alerts.clone();
            tokio::spawn(async move { sink.send(alert).await });
        }
        if let Some(delay) = fx.reset_after {
            self.spawn_reset(delay);
        }
        if fx.reconnect {
            self.spawn_reconnect();
        }
    }

    fn report<T>(
        &self,
        sender: &str,
        result: Result<T, CommandRejected>,
    ) -> Result<T, CommandRejected> {
        if let Err(reason) = &result {
            debug!(machine = %self.name, %sender, %reason, "Input rejected");
            let _ = self.events.send(SchedulerEvent::CommandRejected {
                machine: self.name.clone(),
                player: sender.to_string(),
                reason: reason.to_string(),
            });
        }
        result
    }

    fn enqueue_for(
        self: &Arc<Self>,
        participant: &str,
        commands: Vec<Command>,
        grouped: bool,
    ) -> Result<Submitted, CommandRejected> {
        if commands.is_empty() {
            return Err(CommandRejected::Invalid("No commands".to_string()));
        }

        self.transition(|this, state, fx| {
            if state.availability != Availability::Online {
                return Err(CommandRejected::MachineUnavailable);
            }

            let owns_turn = state.live_token().is_some_and(|t| {
                state.players.same_identity(&t.player, participant)
                    && state
                        .players
                        .current_player()
                        .is_some_and(|c| state.players.same_identity(c, participant))
            });
            if !owns_turn {
                return Err(CommandRejected::NotYourTurn);
            }
            if !state.round.accepts_input() {
                return Err(CommandRejected::InputLocked);
            }

            let count = commands.len();
            let destructive = commands.iter().any(Command::is_destructive);
            // an attempt while the machine settles still counts as engagement
            state.round.mark_acted();

            let pending = if grouped {
                state.commands.enqueue_group(commands)
            } else {
                state.commands.enqueue_batch(commands)
            }
            .map_err(|_| CommandRejected::InputLocked)?;

            if destructive {
                state.round.mark_draining();
            }

            debug!(machine = %this.name, player = %participant, count, pending, "Commands queued");
            fx.events.push(SchedulerEvent::CommandAccepted {
                machine: this.name.clone(),
                player: participant.to_string(),
                commands: count,
            });
            if state.commands.try_start_drain() {
                fx.drain = Some(state.session.clone());
            }
            Ok(Submitted::Queued {
                commands: count,
                pending,
            })
        })
    }

    fn gift_turn_inner(self: &Arc<Self>, from: &str, to: &str) -> Result<Submitted, CommandRejected> {
        let to = to.trim();
        if to.is_empty() {
            return Err(CommandRejected::Invalid("No recipient".to_string()));
        }

        self.transition(|this, state, fx| {
            let token = state
                .live_token()
                .filter(|t| state.players.same_identity(&t.player, from))
                .ok_or(CommandRejected::NotYourTurn)?;
            if !state.round.accepts_input() {
                return Err(CommandRejected::InputLocked);
            }
            if state.players.same_identity(from, to) {
                return Err(CommandRejected::Invalid("Cannot gift a turn to yourself".to_string()));
            }

            state
                .players
                .replace(&token.player, to)
                .map_err(|_| CommandRejected::NotQueued(token.player.clone()))?;
            info!(machine = %this.name, from = %token.player, %to, "Turn gifted");
            this.end_turn_locked(state, fx, &token, TurnEndReason::Gifted);
            this.start_round_locked(state, fx, Some(to));
            Ok(Submitted::Gifted { to: to.to_string() })
        })
    }

    /// One drain step: settle the command that just finished, then pop the
    /// next one. `None` ends the loop.
    fn drain_step(
        self: &Arc<Self>,
        session: &CancellationToken,
        finished: Option<&Command>,
    ) -> Option<Command> {
        self.transition(|this, state, fx| {
            if session.is_cancelled() {
                return None;
            }
            let signal = state.policy.completion_signal();

            if finished.is_some_and(Command::is_destructive) && signal == CompletionSignal::DropDispatched {
                this.complete_dropping_locked(state, fx);
            }

            match state.commands.next_for_drain() {
                Some(cmd) => {
                    if cmd.is_destructive() {
                        state.commands.lock_input();
                        state.round.mark_awaiting_hardware();
                    }
                    Some(cmd)
                }
                None => {
                    if signal == CompletionSignal::SequenceFinished && state.commands.is_input_locked() {
                        state.commands.unlock_input();
                        this.complete_dropping_locked(state, fx);
                    }
                    None
                }
            }
        })
    }

    fn spawn_drain(self: &Arc<Self>, session: CancellationToken) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut finished: Option<Command> = None;
            loop {
                let Some(scheduler) = weak.upgrade() else {
                    return;
                };
                let Some(cmd) = scheduler.drain_step(&session, finished.as_ref()) else {
                    return;
                };
                let machine = scheduler.machine.clone();
                let name = scheduler.name.clone();
                drop(scheduler);

                let result = tokio::select! {
                    _ = session.cancelled() => return,
                    result = command_queue::dispatch(machine.as_ref(), &cmd) => result,
                };
                if let Err(e) = result {
                    warn!(machine = %name, direction = %cmd.direction, error = %e, "Command dispatch failed");
                }
                finished = Some(cmd);
            }
        });
    }

    fn spawn_round_timer(self: &Arc<Self>, token: RoundToken, session: CancellationToken) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let grace = self.settings.grace_window;
        let remaining = self.settings.round_duration.saturating_sub(grace);

        tokio::spawn(async move {
            tokio::select! {
                _ = session.cancelled() => return,
                _ = tokio::time::sleep(grace) => {}
            }
            match weak.upgrade() {
                Some(scheduler) => {
                    scheduler.handle_grace_expiry(&token);
                    if !scheduler.state.lock().round.is_live(&token) {
                        return;
                    }
                }
                None => return,
            }

            tokio::select! {
                _ = session.cancelled() => return,
                _ = tokio::time::sleep(remaining) => {}
            }
            if let Some(scheduler) = weak.upgrade() {
                scheduler.handle_hard_expiry(&token);
            }
        });
    }

    fn spawn_reset(&self, delay: Duration) {
        let machine = self.machine.clone();
        let binding = self.binding.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = binding.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            match machine.reset().await {
                Ok(()) => info!(machine = %name, "Reset sent"),
                Err(e) => warn!(machine = %name, error = %e, "Reset failed"),
            }
        });
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let machine = self.machine.clone();
        let binding = self.binding.clone();
        let interval = self.settings.reconnect_interval;
        let name = self.name.clone();

        tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                machine.disconnect().await;
                match machine.connect().await {
                    Ok(()) => {
                        info!(machine = %name, attempt, "Reconnected");
                        if let Some(scheduler) = weak.upgrade() {
                            scheduler.resync();
                        }
                        return;
                    }
                    Err(e) => warn!(machine = %name, attempt, error = %e, "Reconnect failed"),
                }

                tokio::select! {
                    _ = binding.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
    }

    /// Pick scheduling back up after a reconnect. Missed commands are not
    /// replayed.
    fn resync(self: &Arc<Self>) {
        self.transition(|this, state, fx| {
            if state.availability == Availability::OutOfRotation {
                return;
            }
            state.availability = Availability::Online;
            state.commands.clear();

            let play_active = this.machine.is_play_active();
            if !play_active {
                state.commands.unlock_input();
            }

            let drop_pending = matches!(
                state.round.phase(),
                RoundPhase::Draining | RoundPhase::AwaitingHardwareReturn
            );
            if drop_pending {
                if !play_active {
                    this.complete_dropping_locked(state, fx);
                }
                return;
            }

            if let Some(token) = state.live_token() {
                this.start_round_locked(state, fx, Some(&token.player));
            } else if let Some(current) = state.players.current_player().map(str::to_string) {
                this.start_round_locked(state, fx, Some(&current));
            }
        });
    }

    fn spawn_event_pump(self: &Arc<Self>, mut machine_events: broadcast::Receiver<MachineEvent>) {
        let weak = Arc::downgrade(self);
        let binding = self.binding.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = binding.cancelled() => break,
                    received = machine_events.recv() => received,
                };
                match received {
                    Ok(event) => match weak.upgrade() {
                        Some(scheduler) => scheduler.handle_machine_event(event),
                        None => break,
                    },
                    Err(RecvError::Lagged(n)) => {
                        warn!(machine = %name, skipped = n, "Machine event pump lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(machine = %name, "Machine event pump stopped");
        });
    }
}

impl Drop for TurnScheduler {
    fn drop(&mut self) {
        self.binding.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedMachine;
    use crate::modes::policy_for;
    use crate::notify::WebhookNotifier;

    fn scheduler(mode: GameMode) -> (Arc<SimulatedMachine>, Arc<TurnScheduler>) {
        let machine = Arc::new(SimulatedMachine::manual("claw1"));
        let scheduler = TurnScheduler::bind(
            machine.clone(),
            policy_for(mode),
            SchedulerSettings::default(),
            Arc::new(WebhookNotifier::new(None)),
        );
        (machine, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn reset_round_bumps_generation_and_clears_queue() {
        let (_machine, scheduler) = scheduler(GameMode::Single);
        scheduler.join(JoinRequest::new("alice")).unwrap();
        assert_eq!(scheduler.status().generation, 1);

        assert_eq!(scheduler.start_round(None), None);
        let status = scheduler.status();
        assert_eq!(status.generation, 2);
        assert!(status.players.is_empty());
        assert_eq!(status.phase, RoundPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn start_round_for_absent_player_stays_idle() {
        let (_machine, scheduler) = scheduler(GameMode::Single);
        assert_eq!(scheduler.start_round(Some("ghost")), None);
        assert_eq!(scheduler.status().phase, RoundPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn plain_chat_is_ignored() {
        let (_machine, scheduler) = scheduler(GameMode::Single);
        scheduler.join(JoinRequest::new("alice")).unwrap();
        assert_eq!(
            scheduler.submit_message("alice", "hello there"),
            Ok(Submitted::Ignored)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_published() {
        let (_machine, scheduler) = scheduler(GameMode::Single);
        let mut events = scheduler.subscribe();
        scheduler.join(JoinRequest::new("alice")).unwrap();

        assert_eq!(
            scheduler.submit_message("bob", "f"),
            Err(CommandRejected::NotYourTurn)
        );

        let mut saw_rejection = false;
        while let Ok(event) = events.try_recv() {
            if let SchedulerEvent::CommandRejected { player, .. } = event {
                assert_eq!(player, "bob");
                saw_rejection = true;
            }
        }
        assert!(saw_rejection);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_success_records_latency() {
        let (_machine, scheduler) = scheduler(GameMode::Single);
        scheduler.handle_machine_event(MachineEvent::PingSuccess { latency_ms: 42 });
        assert_eq!(scheduler.status().latency_ms, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_event_pump() {
        let (machine, scheduler) = scheduler(GameMode::Single);
        scheduler.shutdown();
        tokio::task::yield_now().await;

        machine.emit(MachineEvent::PingSuccess { latency_ms: 7 });
        tokio::task::yield_now().await;
        assert_eq!(scheduler.status().latency_ms, None);
    }
}
