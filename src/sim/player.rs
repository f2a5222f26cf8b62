//! Players: a sprite plus identity, turn flag and role
//!
//! Roles form a closed set. The participant is driven by clicks and keys;
//! confederates are driven by the turn-taking engine. Both share the same
//! sprite capabilities and bus subscriptions:
//! - `turn`: take the turn if named, then run the role's on-turn hook
//! - `throwto`: hold the turn only if named as the recipient
//! - `render`: pick the idle/throwing state, then draw with labels

use glam::Vec2;

use super::session::Session;
use super::sprite::{Appearance, EntityId, Sprite, SpriteError, SpriteSheet};
use crate::bus::{BusHost, Channel, Event, EventBus, Owner};
use crate::renderer::Surface;

/// Visual state while holding the ball
pub const THROWING_STATE: &str = "throw1";
/// Visual state otherwise
pub const IDLE_STATE: &str = "idle";

/// Gap between the sprite and the "your turn" label
const TURN_LABEL_GAP: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Human-controlled
    Participant,
    /// Scripted
    Confederate,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub sprite: Sprite,
    pub name: String,
    pub role: Role,
    /// Holding the ball
    pub turn: bool,
    /// A confederate throw is already scheduled for this turn
    pub pending_throw: bool,
}

impl Player {
    pub fn new(id: EntityId, name: impl Into<String>, role: Role, appearance: Appearance) -> Self {
        Self {
            sprite: Sprite::new(id, SpriteSheet::player(), appearance),
            name: name.into(),
            role,
            turn: false,
            pending_throw: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.sprite.id
    }

    pub fn is_participant(&self) -> bool {
        self.role == Role::Participant
    }

    /// Throwing state while holding the turn, idle otherwise
    pub fn select_visual_state(&mut self) -> Result<(), SpriteError> {
        let state = if self.turn { THROWING_STATE } else { IDLE_STATE };
        self.sprite.set_sprite(state)
    }

    /// While holding the turn, face the side of the canvas the pointer is on
    pub fn face_pointer(&mut self, pointer: Option<Vec2>, canvas_width: f32) {
        self.sprite.flip = self.turn && pointer.is_some_and(|p| p.x < canvas_width / 2.0);
    }

    /// Draw the sprite with its name, plus the turn prompt for the participant
    pub fn render(&self, surface: &mut dyn Surface, turn_text: &str) {
        let show_prompt = self.is_participant() && self.turn;
        self.sprite.render(surface, |sprite, surface| {
            surface.fill_text(&self.name, sprite.pos);
            if show_prompt {
                let at = sprite.pos + Vec2::new(0.0, sprite.size.y + TURN_LABEL_GAP);
                surface.fill_text(turn_text, at);
            }
        });
    }
}

/// Hook up a player's bus subscriptions under its own lifetime token
pub(crate) fn subscribe(bus: &mut EventBus<Session>, player: &Player) -> Owner {
    let id = player.id();
    let owner = Owner(id.0);

    bus.register_owned(owner, Channel::Turn, move |s: &mut Session, e| {
        if *e != Event::Turn(id) {
            return;
        }
        let Some(p) = s.player_mut(id) else { return };
        p.turn = true;
        let role = p.role;
        match role {
            Role::Confederate => s.schedule_confederate_throw(id),
            // The participant acts on clicks, not on turn events
            Role::Participant => {}
        }
    });

    bus.register_owned(owner, Channel::ThrowTo, move |s: &mut Session, e| {
        if let Event::ThrowTo { to, .. } = *e
            && let Some(p) = s.player_mut(id)
        {
            p.turn = to == id;
            p.pending_throw = false;
        }
    });

    // State selection must run before the draw below
    bus.register_owned(owner, Channel::Render, move |s: &mut Session, _| {
        s.select_player_state(id);
    });
    bus.register_owned(owner, Channel::Render, move |s: &mut Session, _| {
        s.render_player(id);
    });

    bus.register_owned(owner, Channel::Click, move |s: &mut Session, e| {
        if let Event::Click(p) = *e
            && s.player(id).is_some_and(|pl| pl.sprite.in_bounds(p))
        {
            s.emit(Event::Clicked(id));
        }
    });

    if player.is_participant() {
        bus.register_owned(owner, Channel::Clicked, move |s: &mut Session, e| {
            let Event::Clicked(target) = *e else { return };
            let holds_turn = s.player(id).is_some_and(|p| p.turn);
            let target_is_other_player = target != id && s.player(target).is_some();
            if holds_turn && target_is_other_player {
                s.emit(Event::ThrowTo {
                    from: Some(id),
                    to: target,
                });
            }
        });
    }

    owner
}
