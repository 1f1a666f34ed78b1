use anyhow::{Result, bail};
use chrono::Local;
use kaiwa_application::AppContext;

pub async fn list(app: &AppContext) -> Result<()> {
    let sessions = app.coordinator.observe_sessions().await.borrow().clone();
    if sessions.is_empty() {
        println!("No sessions yet. Start one with `kaiwa send <text>`.");
        return Ok(());
    }
    for session in sessions {
        let when = session.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let image = if session.has_image { " [image]" } else { "" };
        println!("{}  {}  {}", session.id, when, session.title);
        if !session.last_message.is_empty() {
            println!("    > {}{}", preview(&session.last_message), image);
        }
    }
    Ok(())
}

pub async fn create(app: &AppContext, title: &str) -> Result<()> {
    let id = app.coordinator.create_session(title).await?;
    println!("{id}");
    Ok(())
}

pub async fn show(app: &AppContext, session_id: &str) -> Result<()> {
    let Some(session) = app.coordinator.find_session(session_id).await? else {
        bail!("No session with id {session_id}");
    };
    println!("# {}", session.title);
    for message in app.coordinator.list_messages(session_id).await? {
        let speaker = if message.is_user { "you" } else { "model" };
        println!();
        println!("[{speaker}] {}", message.content);
        if let Some(path) = &message.image_path {
            println!("  (image: {path})");
        }
    }
    Ok(())
}

pub async fn delete(app: &AppContext, session_id: &str) -> Result<()> {
    if app.coordinator.find_session(session_id).await?.is_none() {
        bail!("No session with id {session_id}");
    }
    app.coordinator.delete_session(session_id).await?;
    println!("Deleted {session_id}");
    Ok(())
}

pub async fn clear(app: &AppContext, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("This deletes every session. Run `kaiwa clear --yes` to confirm.");
    }
    app.coordinator.clear_history().await?;
    println!("History cleared.");
    Ok(())
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut preview: String = first_line.chars().take(60).collect();
    if preview.len() < text.len() {
        preview.push('…');
    }
    preview
}
