use anyhow::Result;

mod app;
mod catalog;
mod engine;
mod handler;
mod session;
mod storage;
mod transcript;
mod tui;
mod ui;

use app::App;
use engine::EngineClient;
use storage::WidgetStore;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    // Only one widget per process; a second invocation does nothing.
    if !app::claim_widget_slot() {
        return Ok(());
    }

    tui::install_panic_hook();

    let store = WidgetStore::open()?;
    let engine = EngineClient::default_local();

    let mut events = EventHandler::new();
    let mut app = App::new(store, engine, events.sender());

    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app, &mut events).await;
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    terminal.draw(|frame| ui::render(app, frame))?;
    while !app.should_quit {
        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event)?;
        terminal.draw(|frame| ui::render(app, frame))?;
    }
    Ok(())
}
