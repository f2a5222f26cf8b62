//! Cyberball entry point
//!
//! Browser: loads the configuration documents, wires DOM input to the
//! session and pumps it every animation frame.
//! Native: headless rehearsal of one session with a simulated participant.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use thiserror::Error;

/// Anything that can stop the experiment before or while it boots
#[derive(Debug, Error)]
enum BootError {
    #[error(transparent)]
    Cyberball(#[from] cyberball::Error),
    #[error(transparent)]
    Config(#[from] cyberball::config::ConfigError),
    #[error("missing {0}")]
    Missing(String),
    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },
}

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use glam::Vec2;
    use wasm_bindgen::prelude::*;
    use web_sys::{Document, HtmlCanvasElement, KeyboardEvent, MouseEvent};

    use cyberball::config::Settings;
    use cyberball::renderer::CanvasSurface;
    use cyberball::sim::{DeliveryStatus, Phase, Session, SystemClock};
    use cyberball::transport::FetchTransport;
    use cyberball::{Condition, Options, Strings, fatal};

    use super::BootError;

    fn js(err: JsValue) -> BootError {
        BootError::Missing(format!("browser API ({err:?})"))
    }

    fn document() -> Option<Document> {
        web_sys::window()?.document()
    }

    fn set_hidden(document: &Document, id: &str, hidden: bool) {
        if let Some(el) = document.get_element_by_id(id) {
            let _ = el.set_attribute("class", if hidden { "hidden" } else { "" });
        }
    }

    fn set_text(document: &Document, id: &str, text: Option<&str>) {
        if let (Some(el), Some(text)) = (document.get_element_by_id(id), text) {
            el.set_text_content(Some(text));
        }
    }

    /// Fetch a document relative to the page
    async fn load(path: &str) -> Result<String, BootError> {
        let window = web_sys::window().ok_or_else(|| BootError::Missing("window".into()))?;
        let base = window.location().href().map_err(js)?;
        let url = web_sys::Url::new_with_base(path, &base).map_err(js)?.href();
        let failed = |e: reqwest::Error| BootError::Load {
            path: path.to_string(),
            reason: e.to_string(),
        };
        let response = reqwest::get(&url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(failed)?;
        response.text().await.map_err(failed)
    }

    /// URL query parameter `key`
    fn param(key: &str) -> Result<String, BootError> {
        let window = web_sys::window().ok_or_else(|| BootError::Missing("window".into()))?;
        let search = window.location().search().map_err(js)?;
        let params = web_sys::UrlSearchParams::new_with_str(&search).map_err(js)?;
        params
            .get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| BootError::Missing(format!("URL parameter \"{key}\"")))
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        let _ = console_log::init_with_level(log::Level::Info);
        log::info!("Cyberball starting...");

        if let Err(e) = boot().await {
            let notice = fatal(&e);
            if let Some(window) = web_sys::window() {
                let _ = window.alert_with_message(notice);
            }
            if let Some(document) = document() {
                set_hidden(&document, "connecting", true);
                set_hidden(&document, "fatal", false);
            }
        }
    }

    async fn boot() -> Result<(), BootError> {
        let condition_id = param("condition")?;
        let participant_id = param("id")?;

        let options = Options::from_json(&load("options.json").await?)?;
        let strings = Strings::from_json(&load("strings.json").await?)?;
        let condition =
            Condition::from_json(&load(&format!("conditions/{condition_id}.json")).await?)?;
        let settings = Settings::resolve(&options, &condition)?;

        let document = document().ok_or_else(|| BootError::Missing("document".into()))?;
        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .and_then(|el| el.dyn_into().ok())
            .ok_or_else(|| BootError::Missing("canvas element".into()))?;
        let surface = CanvasSurface::new(canvas.clone())
            .ok_or_else(|| BootError::Missing("2D canvas context".into()))?;
        surface.fit_to_client();
        let pointer = surface.pointer_handle();

        set_text(&document, "connecting-text", strings.text("connecting-text"));
        set_text(&document, "probe-text", strings.text("probe-text"));
        set_text(&document, "end-text", strings.text("end-text"));

        let session = Session::new(
            settings,
            strings,
            participant_id,
            Box::new(FetchTransport::new()),
            Box::new(surface),
            Rc::new(SystemClock::new()),
        );
        let session = Rc::new(RefCell::new(session));

        setup_input_handlers(&canvas, Rc::clone(&session), pointer);
        setup_probe_buttons(&document, Rc::clone(&session));

        session.borrow_mut().connect();
        set_hidden(&document, "connecting", false);
        request_animation_frame(session, Rc::new(Cell::new(false)));
        log::info!("Cyberball running!");
        Ok(())
    }

    fn setup_input_handlers(
        canvas: &HtmlCanvasElement,
        session: Rc<RefCell<Session>>,
        pointer: Rc<Cell<Option<Vec2>>>,
    ) {
        // Mouse move - the participant faces the pointer
        {
            let closure = Closure::<dyn FnMut(_)>::new(move |event: MouseEvent| {
                pointer.set(Some(Vec2::new(event.offset_x() as f32, event.offset_y() as f32)));
            });
            let _ = canvas
                .add_event_listener_with_callback("mousemove", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Mouse down - hit test and throw
        {
            let session = Rc::clone(&session);
            let closure = Closure::<dyn FnMut(_)>::new(move |event: MouseEvent| {
                let at = Vec2::new(event.offset_x() as f32, event.offset_y() as f32);
                session.borrow_mut().pointer_down(at);
            });
            let _ = canvas
                .add_event_listener_with_callback("mousedown", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Keyboard - digits throw to confederate N
        if let Some(window) = web_sys::window() {
            let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
                if let Some(n) = event.key().chars().next().and_then(|c| c.to_digit(10))
                    && event.key().len() == 1
                {
                    session.borrow_mut().press_key(n);
                }
            });
            let _ = window
                .add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_probe_buttons(document: &Document, session: Rc<RefCell<Session>>) {
        for (id, report) in [("answer0", 0u8), ("answer1", 1u8)] {
            if let Some(btn) = document.get_element_by_id(id) {
                let session = Rc::clone(&session);
                let closure = Closure::<dyn FnMut(_)>::new(move |_event: MouseEvent| {
                    if session.borrow_mut().answer_probe(report) {
                        log::info!("Probe answered: {report}");
                    }
                });
                let _ =
                    btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
                closure.forget();
            }
        }
    }

    fn request_animation_frame(session: Rc<RefCell<Session>>, finished: Rc<Cell<bool>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |_time: f64| {
            game_loop(session, finished);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(session: Rc<RefCell<Session>>, finished: Rc<Cell<bool>>) {
        {
            let mut s = session.borrow_mut();
            s.pump();
            update_overlays(&s, &finished);
        }
        if !finished.get() {
            request_animation_frame(session, finished);
        }
    }

    /// Show the dialogue matching the session phase
    fn update_overlays(session: &Session, finished: &Cell<bool>) {
        let Some(document) = document() else { return };
        let phase = session.phase();
        set_hidden(&document, "connecting", phase != Phase::Connecting);
        set_hidden(&document, "probe-dialogue", phase != Phase::Probe);

        match phase {
            Phase::Aborted => {
                set_hidden(&document, "fatal", false);
                set_text(&document, "fatal", session.fatal_notice());
                finished.set(true);
            }
            Phase::Ended if session.delivery() != DeliveryStatus::Sending => {
                let query = web_sys::window()
                    .and_then(|w| w.location().search().ok())
                    .unwrap_or_default();
                if let Some(link) = session.settings().survey_link(query.trim_start_matches('?'))
                    && let Some(el) = document.get_element_by_id("survey-link")
                {
                    let _ = el.set_attribute("href", &link);
                }
                set_hidden(&document, "end-dialogue", false);
                finished.set(true);
            }
            _ => {}
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    wasm_game::run().await;
}

#[cfg(not(target_arch = "wasm32"))]
mod rehearsal {
    use std::rc::Rc;

    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    use cyberball::config::Settings;
    use cyberball::renderer::RecordingSurface;
    use cyberball::sim::{Clock, ManualClock, Phase, Session};
    use cyberball::transport::{HttpTransport, MemoryTransport, Transport};
    use cyberball::{Condition, Options, Strings};

    use super::BootError;

    fn read(path: &str) -> Result<String, BootError> {
        std::fs::read_to_string(path).map_err(|e| BootError::Load {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// `cyberball <options.json> [condition.json] [participant-id]`
    pub fn run(args: &[String]) -> Result<(), BootError> {
        let options_path = args
            .first()
            .ok_or_else(|| BootError::Missing("options document argument".into()))?;
        let options = Options::from_json(&read(options_path)?)?;
        let condition = match args.get(1) {
            Some(path) => Condition::from_json(&read(path)?)?,
            None => Condition::default(),
        };
        let participant_id = args.get(2).cloned().unwrap_or_else(|| "rehearsal".to_string());
        let settings = Settings::resolve(&options, &condition)?;

        let transport: Box<dyn Transport> = if settings.data_server_url.is_some() {
            Box::new(HttpTransport::new())
        } else {
            log::warn!("No data-server-url; session data stays in memory");
            Box::new(MemoryTransport::new())
        };
        let mut rng = Pcg32::seed_from_u64(settings.seed.unwrap_or_else(rand::random));
        let clock = ManualClock::new(0);
        let mut session = Session::new(
            settings,
            Strings::default(),
            participant_id,
            transport,
            Box::new(RecordingSurface::new(800.0, 600.0)),
            Rc::new(clock.clone()),
        );

        session.connect();
        // When the simulated participant will act on the ball it holds
        let mut reaction: Option<u64> = None;
        while !matches!(session.phase(), Phase::Ended | Phase::Aborted) {
            if session.phase() == Phase::Probe {
                clock.advance(rng.random_range(800..2_500));
                session.answer_probe(rng.random_range(0..2));
                continue;
            }

            let now = clock.now_ms();
            let mut next = session.next_due();
            if session.phase() == Phase::Running && session.participant().turn {
                let due = *reaction.get_or_insert_with(|| now + rng.random_range(400..2_000));
                if due <= now {
                    let others: Vec<_> = session.players()[1..]
                        .iter()
                        .map(|p| p.sprite.center)
                        .collect();
                    let target = others[rng.random_range(0..others.len())];
                    session.pointer_down(target);
                    reaction = None;
                    continue;
                }
                next = Some(next.map_or(due, |n| n.min(due)));
            } else {
                reaction = None;
            }

            let Some(next) = next else { break };
            clock.set(next);
            session.pump();
        }

        if let Some(notice) = session.fatal_notice() {
            // Already logged when the session aborted
            eprintln!("{notice}");
            std::process::exit(1);
        }
        log::info!(
            "Rehearsal finished: {} throws, {} probes, delivery {:?}",
            session.throws(),
            session.probes_shown(),
            session.delivery()
        );
        let payload = session
            .recorder()
            .payload()
            .map_err(cyberball::Error::from)?;
        match serde_json::to_string_pretty(&payload) {
            Ok(json) => println!("{json}"),
            Err(e) => log::warn!("Could not print session log: {e}"),
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn write_options(name: &str, json: &str) -> String {
            let path = std::env::temp_dir().join(format!(
                "cyberball-{}-{name}.json",
                std::process::id()
            ));
            std::fs::write(&path, json).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[test]
        fn test_rehearsal_runs_to_the_time_limit() {
            let path = write_options(
                "limit",
                r#"{"time-limit": "20s", "probe-intervals": ["5s"], "seed": 9}"#,
            );
            let result = run(&[path.clone()]);
            let _ = std::fs::remove_file(&path);
            assert!(result.is_ok(), "{result:?}");
        }

        #[test]
        fn test_rehearsal_rejects_bad_documents() {
            assert!(matches!(run(&[]), Err(BootError::Missing(_))));
            assert!(matches!(
                run(&["/nonexistent/cyberball/options.json".to_string()]),
                Err(BootError::Load { .. })
            ));

            let path = write_options("zero-goal", r#"{"throw-goal": 0}"#);
            let result = run(&[path.clone()]);
            let _ = std::fs::remove_file(&path);
            assert!(matches!(result, Err(BootError::Config(_))));
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Cyberball (native) starting headless rehearsal...");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = rehearsal::run(&args) {
        eprintln!("{}", cyberball::fatal(&e));
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
