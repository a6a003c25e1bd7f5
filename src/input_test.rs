use uuid::Uuid;

use super::*;

// =============================================================
// Modifiers / Key
// =============================================================

#[test]
fn modifiers_default_all_false() {
    let m = Modifiers::default();
    assert!(!m.shift);
    assert!(!m.ctrl);
    assert!(!m.alt);
    assert!(!m.meta);
    assert!(!m.command());
}

#[test]
fn command_accepts_ctrl_or_meta() {
    assert!(Modifiers { ctrl: true, ..Default::default() }.command());
    assert!(Modifiers { meta: true, ..Default::default() }.command());
    assert!(!Modifiers { shift: true, alt: true, ..Default::default() }.command());
}

#[test]
fn key_classification() {
    assert!(Key("Escape".into()).is_escape());
    assert!(Key("Delete".into()).is_delete());
    assert!(Key("Backspace".into()).is_delete());
    assert!(!Key("Enter".into()).is_delete());
    assert!(!Key("Enter".into()).is_escape());
}

// =============================================================
// SessionId
// =============================================================

#[test]
fn session_ids_order_and_display() {
    assert!(SessionId(1) < SessionId(2));
    assert_eq!(SessionId(7).to_string(), "s7");
}

// =============================================================
// InteractionSession
// =============================================================

#[test]
fn default_session_is_idle() {
    let s = InteractionSession::default();
    assert!(s.is_idle());
    assert_eq!(s.id(), None);
    assert!(s.originals().is_empty());
    assert_eq!(s.marquee_rect(), None);
    assert_eq!(s.name(), "idle");
}

#[test]
fn active_session_reports_its_id() {
    let s = InteractionSession::Panning { id: SessionId(3), last_screen: Point::default(), travel_px: 0.0 };
    assert!(!s.is_idle());
    assert_eq!(s.id(), Some(SessionId(3)));
}

#[test]
fn marquee_rect_is_normalized() {
    let s = InteractionSession::MarqueeSelecting {
        id: SessionId(1),
        mode: MarqueeMode::Add,
        start_world: Point::new(100.0, 50.0),
        current_world: Point::new(10.0, 80.0),
        base: Vec::new(),
    };
    assert_eq!(s.marquee_rect(), Some(Bounds { left: 10.0, top: 50.0, right: 100.0, bottom: 80.0 }));
}

#[test]
fn originals_are_exposed_for_editing_sessions() {
    let original = Original {
        id: Uuid::new_v4(),
        geometry: Geometry::new(0.0, 0.0, 10.0, 10.0),
        membership: None,
        connector: None,
    };
    let s = InteractionSession::Rotating {
        id: SessionId(9),
        object_id: original.id,
        center: Point::new(5.0, 5.0),
        grab_angle_deg: 0.0,
        origin: original.geometry,
        originals: vec![original],
    };
    assert_eq!(s.originals(), &[original]);
    assert_eq!(s.name(), "rotate");
}
