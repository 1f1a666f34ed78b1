use anyhow::Result;
use kaiwa_application::AppContext;
use kaiwa_application::controllers::{PromptController, PromptEvent};
use kaiwa_core::config::KaiwaConfig;
use kaiwa_core::engine::Controller;

pub async fn models(app: &AppContext) -> Result<()> {
    let current = &app.config.generation.model;
    let models = app.coordinator.list_models().await?;
    for model in models.iter().filter(|model| model.supports_generation()) {
        let marker = if model.short_name() == current.as_str() { "*" } else { " " };
        println!("{marker} {}", model.short_name());
    }
    Ok(())
}

pub fn prompts(config: &KaiwaConfig, query: Option<&str>) {
    let controller = PromptController::new(config.prompt_templates());
    if let Some(query) = query {
        controller.handle_event(PromptEvent::QueryChanged(query.to_string()));
    }
    let state = controller.current_state();
    if state.visible.is_empty() {
        println!("No prompts match.");
    }
    for prompt in state.visible {
        println!("{:<16} {}", prompt.id, prompt.title);
        println!("{:<16} {}", "", prompt.text);
    }
}
