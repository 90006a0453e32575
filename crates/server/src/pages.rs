//! Server-rendered landing and chat pages.

use client_core::{Notification, NotificationLevel};
use handlebars::{Handlebars, RenderError, TemplateError};
use serde_json::json;
use shared::{
    catalog::{Destination, Showcase, Viewport},
    domain::Message,
};

const EXAMPLE_REQUEST: &str = "Hi, I'm John. I want to visit Mahdia and Monastir on 20/07/2025. We want a tourist guide from 9am to 5pm. My phone number is 25365475 and my email is john@example.com.";

const HIGHLIGHTS: [(&str, &str); 3] = [
    ("2000+", "Years of History"),
    ("1200km", "of Coastline"),
    ("7", "UNESCO Sites"),
];

pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_partial("head", include_str!("../templates/head.hbs"))?;
        registry.register_template_string("landing", include_str!("../templates/landing.hbs"))?;
        registry.register_template_string("chat", include_str!("../templates/chat.hbs"))?;
        Ok(Self { registry })
    }

    /// Landing page with the cards in view from the showcase position. The strip controls
    /// link to the neighbouring positions.
    pub fn landing(
        &self,
        showcase: &Showcase<'_, Destination>,
        viewport: Viewport,
    ) -> Result<String, RenderError> {
        let mut previous = showcase.clone();
        previous.previous();
        let mut next = showcase.clone();
        next.next();

        let highlights: Vec<_> = HIGHLIGHTS
            .iter()
            .map(|(figure, label)| json!({ "figure": figure, "label": label }))
            .collect();
        let viewports: Vec<_> = Viewport::ALL
            .iter()
            .map(|v| json!({ "name": v.as_str(), "current": *v == viewport }))
            .collect();

        let ctx = json!({
            "title": "Explore Tunisia",
            "highlights": highlights,
            "viewports": viewports,
            "view": viewport.as_str(),
            "per_view": viewport.cards_per_view(),
            "cards": showcase.visible(viewport.cards_per_view()),
            "position": showcase.position(),
            "first_card": showcase.position() + 1,
            "total": showcase.len(),
            "previous": previous.position(),
            "next": next.position(),
        });
        self.registry.render("landing", &ctx)
    }

    pub fn chat(
        &self,
        transcript: &[Message],
        notification: Option<&Notification>,
        webhook_configured: bool,
    ) -> Result<String, RenderError> {
        let entries: Vec<_> = transcript
            .iter()
            .map(|message| {
                json!({
                    "origin": message.origin.as_str(),
                    "time": message.timestamp.format("%H:%M").to_string(),
                    "content": message.content,
                })
            })
            .collect();
        let notification = notification.map(|n| {
            json!({
                "level": level_class(n.level),
                "title": n.title,
                "description": n.description,
            })
        });

        let ctx = json!({
            "title": "Tunisia Travel Assistant",
            "webhook_configured": webhook_configured,
            "notification": notification,
            "transcript": entries,
            "example": EXAMPLE_REQUEST,
        });
        self.registry.render("chat", &ctx)
    }
}

fn level_class(level: NotificationLevel) -> &'static str {
    match level {
        NotificationLevel::Success => "success",
        NotificationLevel::Info => "info",
        NotificationLevel::Error => "error",
    }
}
