//! Session orchestration
//!
//! A `Session` owns everything one participant's run needs: the bus and its
//! subscribers, the players and ball, the recorder, the scheduler and the
//! seeded RNG. The host (browser page or headless runner) feeds it pointer
//! and key input and calls `pump` whenever time may have passed.
//!
//! Phases:
//! - `Idle` → `connect` → `Connecting` → (random delay) → `Running`
//! - `Running` ⇄ `Probe` while a mind-wandering probe is open
//! - `Running`/`Probe` → `Ended` on the time limit or the throw goal
//! - any → `Aborted` on a fatal error
//!
//! While halted (probe open, ended, aborted) no render ticks run and no
//! confederate throws fire.

use std::cell::Cell;
use std::rc::Rc;

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::clock::{Clock, ManualClock};
use super::engine::TurnEngine;
use super::player::{self, Player, Role};
use super::scheduler::{Scheduler, Task};
use super::sprite::{Appearance, EntityId, Sprite, SpriteSheet};
use crate::bus::{BusHost, Channel, Event, EventBus, Owner};
use crate::choice::{pick_from_dist, uniform_time};
use crate::config::{Settings, Strings};
use crate::consts::{
    BALL_HAND_OFFSET, BALL_SCALE_FRACTION, CONFEDERATE_RADIUS_FRACTION, PARTICIPANT_ANCHOR,
    PLAYER_SCALE_FRACTION, RESUME_DELAY_MS,
};
use crate::error::{Error, FATAL_NOTICE, fatal};
use crate::recorder::{RecordKind, Recorder};
use crate::renderer::{ShapeKind, Surface};
use crate::transport::{Completion, Transport, TransportError};
use crate::{confederate_positions, pct2px, relpx};

/// Lifetime token for the session's own subscriptions
const SESSION_OWNER: Owner = Owner(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// "Waiting for other players" screen
    Connecting,
    Running,
    /// A probe dialogue is open; the game is paused
    Probe,
    Ended,
    /// Halted by a fatal error
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    TimeLimit,
    ThrowGoal,
}

/// Outcome of the end-of-session upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    NotSent,
    /// Handed to the transport, not settled yet
    Sending,
    Delivered,
    Failed,
}

pub struct Session {
    bus: EventBus<Session>,
    settings: Settings,
    strings: Strings,
    /// Participant first, then confederates in seating order
    players: Vec<Player>,
    ball: Sprite,
    recorder: Recorder,
    transport: Box<dyn Transport>,
    surface: Box<dyn Surface>,
    clock: Rc<dyn Clock>,
    scheduler: Scheduler,
    engine: TurnEngine,
    rng: Pcg32,
    phase: Phase,
    halted: bool,
    /// Probe currently shown, or the next one to schedule
    probe_index: usize,
    probes_shown: usize,
    /// Throws that had a thrower (the opening assignment does not count)
    throws: u32,
    holder: Option<EntityId>,
    /// Bumped on every change of hands
    turn_serial: u64,
    owners: Vec<Owner>,
    failure: Option<Error>,
    end_reason: Option<EndReason>,
    delivery: Rc<Cell<Option<bool>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("holder", &self.holder)
            .field("throws", &self.throws)
            .field("probes_shown", &self.probes_shown)
            .field("bus", &self.bus)
            .finish()
    }
}

impl BusHost for Session {
    fn bus(&self) -> &EventBus<Self> {
        &self.bus
    }

    fn bus_mut(&mut self) -> &mut EventBus<Self> {
        &mut self.bus
    }
}

impl Session {
    pub fn new(
        settings: Settings,
        strings: Strings,
        participant_id: impl Into<String>,
        transport: Box<dyn Transport>,
        surface: Box<dyn Surface>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let seed = settings.seed.unwrap_or_else(rand::random);
        log::info!(
            "New session: condition {}, {} confederates, seed {seed}",
            settings.condition,
            settings.confederates
        );

        let appearance = |i: usize| {
            if settings.desocialized {
                Appearance::Shape(ShapeKind::ROTATION[i % ShapeKind::ROTATION.len()])
            } else {
                Appearance::Sheet
            }
        };
        let mut players = Vec::with_capacity(settings.confederates + 1);
        players.push(Player::new(
            EntityId(1),
            strings.participant_text.clone(),
            Role::Participant,
            appearance(0),
        ));
        for i in 0..settings.confederates {
            players.push(Player::new(
                EntityId(i as u32 + 2),
                strings.confederate_name(i),
                Role::Confederate,
                appearance(i + 1),
            ));
        }
        let ball_id = EntityId(players.len() as u32 + 1);
        let ball = Sprite::new(ball_id, SpriteSheet::ball(), Appearance::Sheet);

        let mut recorder = Recorder::new(
            participant_id,
            settings.condition.clone(),
            settings.data_server_url.clone(),
            Rc::clone(&clock),
        );
        if settings.summary {
            recorder.enable_summary(players[0].id());
        }

        let engine = TurnEngine::new(
            settings.probabilities.clone(),
            settings.schedule.clone(),
            settings.think,
        );

        let mut session = Self {
            bus: EventBus::new(),
            settings,
            strings,
            players,
            ball,
            recorder,
            transport,
            surface,
            clock,
            scheduler: Scheduler::new(),
            engine,
            rng: Pcg32::seed_from_u64(seed),
            phase: Phase::Idle,
            halted: true,
            probe_index: 0,
            probes_shown: 0,
            throws: 0,
            holder: None,
            turn_serial: 0,
            owners: Vec::new(),
            failure: None,
            end_reason: None,
            delivery: Rc::new(Cell::new(None)),
        };
        session.subscribe();
        session
    }

    /// Register players, then the session's bookkeeping, then the ball, so
    /// the ball is drawn on top and a throw is recorded after every player
    /// has updated its turn flag.
    fn subscribe(&mut self) {
        for p in &self.players {
            let owner = player::subscribe(&mut self.bus, p);
            self.owners.push(owner);
        }

        self.bus
            .register_owned(SESSION_OWNER, Channel::ThrowTo, |s: &mut Session, e| {
                if let Event::ThrowTo { from, to } = *e {
                    s.on_throw(from, to);
                }
            });
        self.owners.push(SESSION_OWNER);

        let ball = self.ball.id;
        let ball_owner = Owner(ball.0);
        self.bus
            .register_owned(ball_owner, Channel::Render, |s: &mut Session, _| s.render_ball());
        self.bus
            .register_owned(ball_owner, Channel::Click, move |s: &mut Session, e| {
                if let Event::Click(p) = *e
                    && s.ball.in_bounds(p)
                {
                    s.emit(Event::Clicked(ball));
                }
            });
        self.owners.push(ball_owner);
    }

    // === Accessors ===

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn strings(&self) -> &Strings {
        &self.strings
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn participant(&self) -> &Player {
        &self.players[0]
    }

    pub fn ball(&self) -> &Sprite {
        &self.ball
    }

    /// Current ball holder
    pub fn holder(&self) -> Option<EntityId> {
        self.holder
    }

    pub fn throws(&self) -> u32 {
        self.throws
    }

    pub fn probes_shown(&self) -> usize {
        self.probes_shown
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Earliest pending task, for hosts that sleep between pumps
    pub fn next_due(&self) -> Option<u64> {
        self.scheduler.next_due()
    }

    /// Participant-facing notice if the session was aborted
    pub fn fatal_notice(&self) -> Option<&'static str> {
        self.failure.as_ref().map(|_| FATAL_NOTICE)
    }

    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    pub fn delivery(&self) -> DeliveryStatus {
        if self.phase != Phase::Ended {
            return DeliveryStatus::NotSent;
        }
        match self.delivery.get() {
            None => DeliveryStatus::Sending,
            Some(true) => DeliveryStatus::Delivered,
            Some(false) => DeliveryStatus::Failed,
        }
    }

    pub(crate) fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub(crate) fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id() == id)
    }

    fn index_of(&self, id: EntityId) -> Option<usize> {
        self.players.iter().position(|p| p.id() == id)
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // === Lifecycle ===

    /// Show the connecting screen, then start after a random delay
    pub fn connect(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        let (min, max) = self.settings.connecting;
        let delay = uniform_time(&mut self.rng, min, max);
        log::info!("Connecting to other players ({delay}ms)");
        self.phase = Phase::Connecting;
        self.scheduler.schedule_at(self.now().saturating_add(delay), Task::Start);
    }

    /// Begin recording, arm the timers, hand out the ball and start the loop
    pub fn start(&mut self) {
        if !matches!(self.phase, Phase::Idle | Phase::Connecting) {
            return;
        }
        if let Err(e) = self.recorder.begin() {
            log::warn!("Recorder not started: {e}");
        }
        self.phase = Phase::Running;
        self.halted = false;
        log::info!("Game started");

        let now = self.now();
        self.schedule_probe();
        if let Some(limit) = self.settings.time_limit {
            self.scheduler.schedule_at(now.saturating_add(limit), Task::End);
        }

        let first = pick_from_dist(&mut self.rng, self.engine.weights()).unwrap_or(0);
        let to = self.players[first].id();
        self.emit(Event::ThrowTo { from: None, to });
        self.tick();
    }

    /// Run every task that is due now. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let now = self.now();
        let mut ran = 0;
        while let Some((_, task)) = self.scheduler.pop_due(now) {
            self.run(task);
            ran += 1;
        }
        ran
    }

    /// Drive the session on a manual clock up to `until`, jumping straight
    /// from one due task to the next
    pub fn run_simulated(&mut self, clock: &ManualClock, until: u64) {
        while let Some(due) = self.scheduler.next_due() {
            if due > until {
                break;
            }
            clock.set(due);
            self.pump();
        }
        clock.set(until);
    }

    fn run(&mut self, task: Task) {
        match task {
            Task::Start => self.start(),
            Task::Tick => self.tick(),
            Task::ConfederateThrow { player, serial } => self.confederate_throw(player, serial),
            Task::Probe { index } => self.show_probe(index),
            Task::ProbeTimeout { index } => {
                if self.phase == Phase::Probe && self.probe_index == index {
                    log::info!("Probe {index} timed out");
                    self.close_probe(None);
                }
            }
            Task::End => self.end_session(EndReason::TimeLimit),
        }
    }

    /// One frame: lay out, clear, render, announce the holder, reschedule
    fn tick(&mut self) {
        if self.halted || self.phase != Phase::Running {
            return;
        }
        self.layout();
        self.surface.clear();
        self.emit(Event::Render);
        if let Some(holder) = self.holder {
            self.emit(Event::Turn(holder));
        }
        self.schedule_tick(self.settings.frame_ms);
    }

    fn schedule_tick(&mut self, delay: u64) {
        if self.halted || self.scheduler.count(|t| *t == Task::Tick) > 0 {
            return;
        }
        let due = self.now().saturating_add(delay);
        self.scheduler.schedule_at(due, Task::Tick);
    }

    /// Position and scale every sprite for the current canvas size
    fn layout(&mut self) {
        let size = self.surface.size();
        let short = size.x.min(size.y);
        let anchor = pct2px(PARTICIPANT_ANCHOR.0, PARTICIPANT_ANCHOR.1, size);
        let pointer = self.surface.pointer();

        let seats = confederate_positions(
            self.players.len() - 1,
            short * CONFEDERATE_RADIUS_FRACTION,
            anchor,
        );
        for (i, p) in self.players.iter_mut().enumerate() {
            let factor = short * PLAYER_SCALE_FRACTION / p.sprite.frame().y;
            p.sprite.scale(factor);
            if i == 0 {
                p.sprite.set_position(anchor);
                p.face_pointer(pointer, size.x);
            } else {
                p.sprite.set_position(seats[i - 1]);
            }
        }

        let factor = short * BALL_SCALE_FRACTION / self.ball.frame().y;
        self.ball.scale(factor);
        let hand = self.holder.and_then(|id| self.player(id)).map(|holder| {
            let s = &holder.sprite;
            let scale = s.size / s.frame();
            let mut at = relpx(BALL_HAND_OFFSET.0 * scale.x, BALL_HAND_OFFSET.1 * scale.y, s.pos);
            if s.flip {
                at.x = 2.0 * s.center.x - at.x;
            }
            at
        });
        if let Some(at) = hand {
            self.ball.set_position(at);
        }
    }

    // === Bus callbacks ===

    fn on_throw(&mut self, from: Option<EntityId>, to: EntityId) {
        self.holder = Some(to);
        self.turn_serial += 1;

        let from_name = from.and_then(|id| self.player(id)).map(|p| p.name.clone());
        let to_name = self.player(to).map(|p| p.name.clone()).unwrap_or_default();
        match from_name.as_deref() {
            Some(thrower) => log::debug!("{thrower} throws to {to_name}"),
            None => log::debug!("{to_name} starts with the ball"),
        }
        let record = RecordKind::Throw {
            from,
            to,
            from_name,
            to_name,
        };
        if let Err(e) = self.recorder.record(record) {
            log::warn!("Throw not recorded: {e}");
        }

        if from.is_some() {
            self.throws += 1;
            if let Some(goal) = self.settings.throw_goal
                && self.throws >= goal
            {
                self.end_session(EndReason::ThrowGoal);
            }
        }
    }

    /// Arm a throw for a confederate that just got the turn. At most one
    /// throw is pending per turn.
    pub(crate) fn schedule_confederate_throw(&mut self, id: EntityId) {
        if self.halted || self.phase != Phase::Running {
            return;
        }
        let serial = self.turn_serial;
        let Some(p) = self.player_mut(id) else { return };
        if !p.turn || p.pending_throw {
            return;
        }
        p.pending_throw = true;

        let delay = self.engine.thinking_time(&mut self.rng);
        let due = self.now().saturating_add(delay);
        self.scheduler
            .schedule_at(due, Task::ConfederateThrow { player: id, serial });
    }

    fn confederate_throw(&mut self, id: EntityId, serial: u64) {
        if serial != self.turn_serial || self.holder != Some(id) {
            log::debug!("Dropping stale throw for {id:?}");
            return;
        }
        if self.halted || self.phase != Phase::Running {
            // Re-armed by the next turn announcement after resuming
            if let Some(p) = self.player_mut(id) {
                p.pending_throw = false;
            }
            return;
        }

        let Some(thrower) = self.index_of(id) else { return };
        match self.engine.select_recipient(&mut self.rng, thrower, 0) {
            Some(index) => {
                let to = self.players[index].id();
                self.emit(Event::ThrowTo { from: Some(id), to });
            }
            None => {
                log::warn!("No recipient available for {id:?}");
                if let Some(p) = self.player_mut(id) {
                    p.pending_throw = false;
                }
            }
        }
    }

    pub(crate) fn select_player_state(&mut self, id: EntityId) {
        if self.failure.is_some() {
            return;
        }
        if let Some(p) = self.player_mut(id)
            && let Err(e) = p.select_visual_state()
        {
            self.abort(e.into());
        }
    }

    pub(crate) fn render_player(&mut self, id: EntityId) {
        if self.failure.is_some() {
            return;
        }
        let Some(index) = self.index_of(id) else { return };
        self.players[index].render(&mut *self.surface, &self.strings.turn_text);
    }

    fn render_ball(&mut self) {
        if self.failure.is_some() || self.holder.is_none() {
            return;
        }
        self.ball.render(&mut *self.surface, |_, _| {});
    }

    // === Input ===

    /// Pointer-down on the canvas at `p`
    pub fn pointer_down(&mut self, p: Vec2) {
        if self.halted || self.phase != Phase::Running {
            return;
        }
        let target = self
            .players
            .iter()
            .find(|pl| pl.sprite.in_bounds(p))
            .map(Player::id);
        let record = RecordKind::Click {
            x: p.x,
            y: p.y,
            target,
        };
        if let Err(e) = self.recorder.record(record) {
            log::warn!("Click not recorded: {e}");
        }
        self.emit(Event::Click(p));
    }

    /// Digit key `n` throws to confederate `n` when key input is enabled
    pub fn press_key(&mut self, n: u32) {
        if !self.settings.key_input || self.halted || self.phase != Phase::Running {
            return;
        }
        let participant = self.participant();
        if !participant.turn || n == 0 {
            return;
        }
        let from = participant.id();
        let Some(to) = self.players.get(n as usize).map(Player::id) else {
            return;
        };
        self.emit(Event::ThrowTo {
            from: Some(from),
            to,
        });
    }

    // === Probes ===

    fn schedule_probe(&mut self) {
        if let Some(&delay) = self.settings.probe_intervals.get(self.probe_index) {
            let due = self.now().saturating_add(delay);
            self.scheduler.schedule_at(
                due,
                Task::Probe {
                    index: self.probe_index,
                },
            );
        }
    }

    fn show_probe(&mut self, index: usize) {
        if self.phase != Phase::Running || index != self.probe_index {
            return;
        }
        log::info!("Showing probe {index}");
        self.phase = Phase::Probe;
        self.halted = true;
        self.probes_shown += 1;
        if let Some(timeout) = self.settings.probe_timeout {
            let due = self.now().saturating_add(timeout);
            self.scheduler.schedule_at(due, Task::ProbeTimeout { index });
        }
    }

    /// Participant's answer to the open probe. Returns false if none is open.
    pub fn answer_probe(&mut self, report: u8) -> bool {
        if self.phase != Phase::Probe {
            return false;
        }
        self.close_probe(Some(report));
        true
    }

    fn close_probe(&mut self, report: Option<u8>) {
        if let Err(e) = self.recorder.record(RecordKind::Probe { report }) {
            log::warn!("Probe not recorded: {e}");
        }
        self.phase = Phase::Running;
        self.halted = false;
        self.probe_index += 1;
        self.schedule_probe();
        self.schedule_tick(RESUME_DELAY_MS);
    }

    // === Ending ===

    fn end_session(&mut self, reason: EndReason) {
        if !matches!(self.phase, Phase::Running | Phase::Probe) {
            return;
        }
        log::info!(
            "Session ended ({reason:?}) after {} throws, {} probes",
            self.throws,
            self.probes_shown
        );
        self.phase = Phase::Ended;
        self.halted = true;
        self.end_reason = Some(reason);
        self.scheduler.clear();

        let settled = Rc::clone(&self.delivery);
        let done: Completion = Box::new(move |result: Result<(), TransportError>| {
            settled.set(Some(result.is_ok()))
        });
        if let Err(e) = self.recorder.send(&*self.transport, Some(done)) {
            log::warn!("Session data not sent: {e}");
        }
        self.teardown();
    }

    /// Halt on a fatal error. Nothing is sent.
    pub fn abort(&mut self, err: Error) {
        if self.phase == Phase::Aborted {
            return;
        }
        fatal(&err);
        self.phase = Phase::Aborted;
        self.halted = true;
        self.failure = Some(err);
        self.scheduler.clear();
        self.teardown();
    }

    /// Drop every bus subscription made by this session
    fn teardown(&mut self) {
        let mut removed = 0;
        for owner in std::mem::take(&mut self.owners) {
            removed += self.bus.unregister_owner(owner);
        }
        log::debug!("Unregistered {removed} handlers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Condition, Options};
    use crate::renderer::RecordingSurface;
    use crate::sim::sprite::SpriteError;
    use crate::transport::MemoryTransport;

    struct Rig {
        session: Session,
        clock: ManualClock,
        transport: MemoryTransport,
    }

    fn rig(options: Options) -> Rig {
        let options = Options {
            seed: Some(42),
            data_server_url: Some("http://localhost/data".into()),
            ..options
        };
        let settings = Settings::resolve(&options, &Condition::default()).unwrap();
        let clock = ManualClock::new(10_000);
        let transport = MemoryTransport::new();
        let session = Session::new(
            settings,
            Strings::default(),
            "p-1",
            Box::new(transport.clone()),
            Box::new(RecordingSurface::new(800.0, 600.0)),
            Rc::new(clock.clone()),
        );
        Rig {
            session,
            clock,
            transport,
        }
    }

    fn confederates_only() -> Options {
        Options {
            probabilities: vec![0.0, 1.0, 1.0],
            ..Options::default()
        }
    }

    fn pending_throws(s: &Session) -> usize {
        s.scheduler
            .count(|t| matches!(t, Task::ConfederateThrow { .. }))
    }

    #[test]
    fn test_exactly_one_holder_at_all_times() {
        let mut r = rig(Options {
            time_limit: Some("20s".into()),
            ..Options::default()
        });
        r.session.start();
        for step in 1..=200 {
            r.session.run_simulated(&r.clock, 10_000 + step * 50);
            let holders: Vec<EntityId> = r
                .session
                .players()
                .iter()
                .filter(|p| p.turn)
                .map(Player::id)
                .collect();
            assert_eq!(holders.len(), 1);
            assert_eq!(Some(holders[0]), r.session.holder());
        }
    }

    #[test]
    fn test_only_one_confederate_throw_pending() {
        let mut r = rig(confederates_only());
        r.session.start();
        // Many ticks inside the shortest thinking time
        r.session.run_simulated(&r.clock, 10_400);
        assert_eq!(pending_throws(&r.session), 1);
        assert_eq!(r.session.throws(), 0);
    }

    #[test]
    fn test_throw_goal_ends_session() {
        let mut r = rig(Options {
            throw_goal: Some(3),
            time_limit: None,
            ..confederates_only()
        });
        r.session.start();
        r.session.run_simulated(&r.clock, 60_000);

        assert_eq!(r.session.phase(), Phase::Ended);
        assert_eq!(r.session.end_reason(), Some(EndReason::ThrowGoal));
        assert_eq!(r.session.throws(), 3);
        assert_eq!(r.transport.count(), 1);
        assert_eq!(r.session.delivery(), DeliveryStatus::Delivered);

        let throws = r
            .session
            .recorder()
            .records()
            .iter()
            .filter(|rec| matches!(rec.kind, RecordKind::Throw { .. }))
            .count();
        assert_eq!(throws, 4);

        // The summary counts the same throws the goal does
        let summary = &r.transport.deliveries()[0].body["data"][0];
        assert_eq!(summary["type"], "summary");
        assert_eq!(summary["throws"], 3);
        assert_eq!(summary["participant_throw_fraction"], 0.0);
        // The participant never got the ball
        assert!(r.session.recorder().records().iter().all(|rec| !matches!(
            rec.kind,
            RecordKind::Throw { to: EntityId(1), .. }
        )));
    }

    #[test]
    fn test_teardown_empties_bus() {
        let mut r = rig(Options {
            time_limit: Some("2s".into()),
            ..Options::default()
        });
        assert!(r.session.bus().total_handlers() > 0);
        r.session.start();
        r.session.run_simulated(&r.clock, 13_000);
        assert_eq!(r.session.phase(), Phase::Ended);
        assert_eq!(r.session.bus().total_handlers(), 0);
        assert_eq!(r.session.next_due(), None);

        // Input after the end is ignored
        r.session.pointer_down(Vec2::new(400.0, 450.0));
        assert_eq!(r.transport.count(), 1);
    }

    #[test]
    fn test_probe_halts_and_drops_throw() {
        let mut r = rig(Options {
            probe_intervals: vec!["100ms".into()],
            min_confederate_time: "500ms".into(),
            max_confederate_time: "600ms".into(),
            ..confederates_only()
        });
        r.session.start();
        let holder = r.session.holder();

        r.session.run_simulated(&r.clock, 10_300);
        assert_eq!(r.session.phase(), Phase::Probe);
        assert!(r.session.is_halted());

        // The armed throw comes due while paused and is discarded
        r.session.run_simulated(&r.clock, 12_000);
        assert_eq!(r.session.phase(), Phase::Probe);
        assert_eq!(r.session.holder(), holder);
        assert_eq!(r.session.throws(), 0);
        assert_eq!(pending_throws(&r.session), 0);

        assert!(r.session.answer_probe(1));
        assert!(!r.session.answer_probe(1));
        r.session.run_simulated(&r.clock, 13_000);
        assert!(r.session.throws() >= 1);
        assert!(r.session.recorder().records().iter().any(|rec| rec.kind
            == RecordKind::Probe { report: Some(1) }));
    }

    #[test]
    fn test_probe_timeout_records_no_answer() {
        let mut r = rig(Options {
            probe_intervals: vec!["1s".into(), "1s".into()],
            probe_timeout: Some("500ms".into()),
            ..Options::default()
        });
        r.session.start();
        r.session.run_simulated(&r.clock, 11_200);
        assert_eq!(r.session.phase(), Phase::Probe);
        r.session.run_simulated(&r.clock, 11_600);
        assert_eq!(r.session.phase(), Phase::Running);
        r.session.run_simulated(&r.clock, 12_700);
        assert_eq!(r.session.probes_shown(), 2);

        let reports: Vec<Option<u8>> = r
            .session
            .recorder()
            .records()
            .iter()
            .filter_map(|rec| match rec.kind {
                RecordKind::Probe { report } => Some(report),
                _ => None,
            })
            .collect();
        assert_eq!(reports, vec![None]);
    }

    #[test]
    fn test_participant_click_throws() {
        let mut r = rig(Options {
            probabilities: vec![1.0, 0.0, 0.0],
            ..Options::default()
        });
        r.session.start();
        let you = r.session.participant().id();
        assert_eq!(r.session.holder(), Some(you));

        // Clicking yourself does nothing
        let own = r.session.participant().sprite.center;
        r.session.pointer_down(own);
        assert_eq!(r.session.holder(), Some(you));

        let target = r.session.players()[2].clone();
        r.session.pointer_down(target.sprite.center);
        assert_eq!(r.session.holder(), Some(target.id()));
        assert_eq!(r.session.throws(), 1);

        let clicks: Vec<Option<EntityId>> = r
            .session
            .recorder()
            .records()
            .iter()
            .filter_map(|rec| match rec.kind {
                RecordKind::Click { target, .. } => Some(target),
                _ => None,
            })
            .collect();
        assert_eq!(clicks, vec![Some(you), Some(target.id())]);

        // Not holding the ball: clicks no longer throw
        let other = r.session.players()[1].sprite.center;
        r.session.pointer_down(other);
        assert_eq!(r.session.holder(), Some(target.id()));
    }

    #[test]
    fn test_key_input() {
        let mut r = rig(Options {
            probabilities: vec![1.0, 0.0, 0.0],
            key_input: true,
            ..Options::default()
        });
        r.session.start();
        r.session.press_key(0);
        r.session.press_key(7);
        assert_eq!(r.session.throws(), 0);
        r.session.press_key(2);
        assert_eq!(r.session.holder(), Some(r.session.players()[2].id()));
    }

    #[test]
    fn test_connecting_delay() {
        let mut r = rig(Options {
            min_connecting_time: "1s".into(),
            max_connecting_time: "2s".into(),
            ..Options::default()
        });
        r.session.connect();
        assert_eq!(r.session.phase(), Phase::Connecting);
        r.session.run_simulated(&r.clock, 10_999);
        assert_eq!(r.session.phase(), Phase::Connecting);
        r.session.run_simulated(&r.clock, 12_000);
        assert_eq!(r.session.phase(), Phase::Running);
        assert!(r.session.recorder().is_active());
    }

    #[test]
    fn test_abort_halts_without_sending() {
        let mut r = rig(Options::default());
        r.session.start();
        r.session.abort(Error::from(SpriteError::UnknownVisualState {
            name: "wave".into(),
        }));
        assert_eq!(r.session.phase(), Phase::Aborted);
        assert_eq!(r.session.fatal_notice(), Some(FATAL_NOTICE));
        assert_eq!(r.session.bus().total_handlers(), 0);
        r.session.run_simulated(&r.clock, 60_000);
        assert_eq!(r.transport.count(), 0);
        assert_eq!(r.session.delivery(), DeliveryStatus::NotSent);
    }

    #[test]
    fn test_desocialized_draws_shapes() {
        let options = Options {
            desocialized: true,
            seed: Some(1),
            ..Options::default()
        };
        let settings = Settings::resolve(&options, &Condition::default()).unwrap();
        let surface = RecordingSurface::new(800.0, 600.0);
        let mut session = Session::new(
            settings,
            Strings::default(),
            "p-2",
            Box::new(MemoryTransport::new()),
            Box::new(surface.clone()),
            Rc::new(ManualClock::new(0)),
        );
        session.start();
        let frame = surface.last_frame();
        let shapes = frame
            .iter()
            .filter(|op| matches!(op, crate::renderer::DrawOp::Shape { .. }))
            .count();
        assert_eq!(shapes, 3);
        assert_eq!(surface.depth(), 0);
    }
}
