use anyhow::{Result, bail};
use kaiwa_application::AppContext;
use kaiwa_application::controllers::{ChatEffect, ChatEvent, ChatState};
use kaiwa_core::engine::Controller;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

/// Sends one turn through the chat controller and prints the reply.
///
/// Waits on the controller's effect stream for the outcome, then on its
/// state stream until that reply is in the message list.
pub async fn run(
    app: &AppContext,
    session: Option<String>,
    image: Option<PathBuf>,
    text: String,
) -> Result<()> {
    if let Some(id) = &session {
        if app.coordinator.find_session(id).await?.is_none() {
            bail!("No session with id {id}");
        }
    }

    let chat = app.chat_controller();
    let mut effects = chat.effect_stream();
    if let Some(id) = session {
        chat.handle_event(ChatEvent::OpenSession(id));
    }
    if let Some(path) = image {
        chat.handle_event(ChatEvent::ImageSelected(path.display().to_string()));
    }
    chat.handle_event(ChatEvent::InputChanged(text));
    chat.handle_event(ChatEvent::SendMessage);

    let reply = loop {
        match effects.recv().await {
            Ok(ChatEffect::MessageSent(reply)) => break reply,
            Ok(ChatEffect::ShowError(message)) => bail!(message),
            Ok(ChatEffect::ScrollToBottom) => {}
            Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("chat controller stopped"),
        }
    };

    // The list may still show the previous turn until the store snapshot lands.
    let mut states = chat.state_stream();
    let state: ChatState = states
        .wait_for(|state| state.messages.iter().any(|message| message.id == reply.id))
        .await?
        .clone();
    println!("{}", reply.content);
    if let Some(id) = state.session_id {
        eprintln!("(session {id})");
    }
    Ok(())
}
