//! Named publish/subscribe channels
//!
//! Every entity in a session talks through the bus: sprites listen for
//! `click`/`render`, players for `turn`/`throwto`, the participant for
//! `clicked`. Dispatch is synchronous and single-threaded:
//! - Handlers for a channel run in registration order
//! - Emitting to a channel nobody listens on is a no-op
//! - A handler may emit again; the nested emission runs depth-first
//!
//! Handlers receive the owning context mutably, so all shared state lives in
//! one place (the session) rather than in globals.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use glam::Vec2;

use crate::sim::EntityId;

/// Channel names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Pointer-down on the canvas
    Click,
    /// A sprite was hit by a pointer-down
    Clicked,
    /// Redraw
    Render,
    /// The ball holder is announced
    Turn,
    /// The ball changes hands
    ThrowTo,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Click => "click",
            Channel::Clicked => "clicked",
            Channel::Render => "render",
            Channel::Turn => "turn",
            Channel::ThrowTo => "throwto",
        }
    }
}

/// Event payloads; each variant travels on exactly one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Click(Vec2),
    Clicked(EntityId),
    Render,
    Turn(EntityId),
    /// `from` is `None` only for the opening assignment of the ball
    ThrowTo { from: Option<EntityId>, to: EntityId },
}

impl Event {
    pub fn channel(&self) -> Channel {
        match self {
            Event::Click(_) => Channel::Click,
            Event::Clicked(_) => Channel::Clicked,
            Event::Render => Channel::Render,
            Event::Turn(_) => Channel::Turn,
            Event::ThrowTo { .. } => Channel::ThrowTo,
        }
    }
}

/// A subscriber callback over context `C`
pub type Handler<C> = Rc<dyn Fn(&mut C, &Event)>;

/// Identifies one registration (the same handler may be registered twice)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Lifetime token; everything registered under it can be dropped at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner(pub u32);

struct Subscription<C> {
    id: HandlerId,
    owner: Option<Owner>,
    handler: Handler<C>,
}

/// Ordered handler lists per channel
pub struct EventBus<C> {
    channels: HashMap<Channel, Vec<Subscription<C>>>,
    next_id: u64,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (channel, subs) in &self.channels {
            map.entry(&channel.as_str(), &subs.len());
        }
        map.finish()
    }
}

impl<C> EventBus<C> {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            next_id: 1,
        }
    }

    /// Append a handler to `channel`
    pub fn register(
        &mut self,
        channel: Channel,
        handler: impl Fn(&mut C, &Event) + 'static,
    ) -> HandlerId {
        self.push(channel, None, Rc::new(handler))
    }

    /// Append an already shared handler (duplicates are kept)
    pub fn register_handler(&mut self, channel: Channel, handler: Handler<C>) -> HandlerId {
        self.push(channel, None, handler)
    }

    /// Append a handler tied to a lifetime token
    pub fn register_owned(
        &mut self,
        owner: Owner,
        channel: Channel,
        handler: impl Fn(&mut C, &Event) + 'static,
    ) -> HandlerId {
        self.push(channel, Some(owner), Rc::new(handler))
    }

    fn push(&mut self, channel: Channel, owner: Option<Owner>, handler: Handler<C>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.channels.entry(channel).or_default().push(Subscription {
            id,
            owner,
            handler,
        });
        id
    }

    /// Remove the first registration matching `id`, or delete the channel if
    /// its list is already empty. Returns whether a handler was removed.
    pub fn unregister(&mut self, channel: Channel, id: HandlerId) -> bool {
        let Some(subs) = self.channels.get_mut(&channel) else {
            return false;
        };
        if subs.is_empty() {
            self.channels.remove(&channel);
            return false;
        }
        match subs.iter().position(|s| s.id == id) {
            Some(index) => {
                subs.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every registration made under `owner`; returns how many went
    pub fn unregister_owner(&mut self, owner: Owner) -> usize {
        let mut removed = 0;
        self.channels.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.owner != Some(owner));
            removed += before - subs.len();
            !subs.is_empty()
        });
        removed
    }

    /// Number of handlers on `channel`
    pub fn handler_count(&self, channel: Channel) -> usize {
        self.channels.get(&channel).map(Vec::len).unwrap_or(0)
    }

    /// Number of handlers across all channels
    pub fn total_handlers(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    /// Whether `channel` still has an entry (possibly empty)
    pub fn has_channel(&self, channel: Channel) -> bool {
        self.channels.contains_key(&channel)
    }

    /// Handlers registered on `channel` right now, in order
    fn snapshot(&self, channel: Channel) -> Vec<Handler<C>> {
        self.channels
            .get(&channel)
            .map(|subs| subs.iter().map(|s| Rc::clone(&s.handler)).collect())
            .unwrap_or_default()
    }
}

/// A context that owns the bus its handlers are registered on
pub trait BusHost: Sized {
    fn bus(&self) -> &EventBus<Self>;
    fn bus_mut(&mut self) -> &mut EventBus<Self>;

    /// Dispatch `event` to the handlers registered on its channel at the
    /// moment of emission. Registrations made during dispatch take effect
    /// from the next emission.
    fn emit(&mut self, event: Event) {
        let handlers = self.bus().snapshot(event.channel());
        for handler in handlers {
            handler(self, &event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        bus: EventBus<Ctx>,
        log: Vec<String>,
    }

    impl BusHost for Ctx {
        fn bus(&self) -> &EventBus<Self> {
            &self.bus
        }
        fn bus_mut(&mut self) -> &mut EventBus<Self> {
            &mut self.bus
        }
    }

    #[test]
    fn test_emit_without_handlers_is_noop() {
        let mut ctx = Ctx::default();
        ctx.emit(Event::Render);
        ctx.emit(Event::Turn(EntityId(3)));
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let mut ctx = Ctx::default();
        ctx.bus.register(Channel::Render, |c: &mut Ctx, _| c.log.push("a".into()));
        ctx.bus.register(Channel::Render, |c: &mut Ctx, _| c.log.push("b".into()));
        ctx.bus.register(Channel::Turn, |c: &mut Ctx, _| c.log.push("turn".into()));
        ctx.emit(Event::Render);
        assert_eq!(ctx.log, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_registration_runs_twice() {
        let mut ctx = Ctx::default();
        let handler: Handler<Ctx> = Rc::new(|c: &mut Ctx, _: &Event| c.log.push("x".into()));
        ctx.bus.register_handler(Channel::Render, Rc::clone(&handler));
        ctx.bus.register_handler(Channel::Render, handler);
        ctx.emit(Event::Render);
        assert_eq!(ctx.log.len(), 2);
    }

    #[test]
    fn test_unregister_only_handler_empties_channel() {
        let mut ctx = Ctx::default();
        let id = ctx
            .bus
            .register(Channel::Clicked, |c: &mut Ctx, _| c.log.push("hit".into()));
        assert!(ctx.bus.unregister(Channel::Clicked, id));
        assert_eq!(ctx.bus.handler_count(Channel::Clicked), 0);
        ctx.emit(Event::Clicked(EntityId(1)));
        assert!(ctx.log.is_empty());

        // A second unregister on the empty list deletes the channel
        assert!(!ctx.bus.unregister(Channel::Clicked, id));
        assert!(!ctx.bus.has_channel(Channel::Clicked));
    }

    #[test]
    fn test_unregister_unknown_id_keeps_others() {
        let mut ctx = Ctx::default();
        let keep = ctx.bus.register(Channel::Render, |_: &mut Ctx, _| {});
        let gone = ctx.bus.register(Channel::Render, |_: &mut Ctx, _| {});
        assert!(ctx.bus.unregister(Channel::Render, gone));
        assert!(!ctx.bus.unregister(Channel::Render, gone));
        assert_eq!(ctx.bus.handler_count(Channel::Render), 1);
        assert!(ctx.bus.unregister(Channel::Render, keep));
    }

    #[test]
    fn test_reentrant_emit_is_depth_first() {
        let mut ctx = Ctx::default();
        ctx.bus.register(Channel::Click, |c: &mut Ctx, _| {
            c.log.push("click-1".into());
            c.emit(Event::Clicked(EntityId(7)));
        });
        ctx.bus.register(Channel::Click, |c: &mut Ctx, _| c.log.push("click-2".into()));
        ctx.bus.register(Channel::Clicked, |c: &mut Ctx, e| {
            if let Event::Clicked(id) = e {
                c.log.push(format!("clicked-{}", id.0));
            }
        });
        ctx.emit(Event::Click(Vec2::ZERO));
        assert_eq!(ctx.log, vec!["click-1", "clicked-7", "click-2"]);
    }

    #[test]
    fn test_unregister_owner_removes_across_channels() {
        let mut ctx = Ctx::default();
        let a = Owner(1);
        let b = Owner(2);
        ctx.bus.register_owned(a, Channel::Render, |_: &mut Ctx, _| {});
        ctx.bus.register_owned(a, Channel::Turn, |_: &mut Ctx, _| {});
        ctx.bus.register_owned(b, Channel::Turn, |_: &mut Ctx, _| {});
        assert_eq!(ctx.bus.unregister_owner(a), 2);
        assert_eq!(ctx.bus.total_handlers(), 1);
        assert!(!ctx.bus.has_channel(Channel::Render));
        assert_eq!(ctx.bus.unregister_owner(b), 1);
        assert_eq!(ctx.bus.total_handlers(), 0);
    }
}
