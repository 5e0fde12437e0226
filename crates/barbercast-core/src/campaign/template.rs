//! Message Renderer - Personalizes campaign messages per contact

use barbercast_storage::models::{Campaign, Contact};
use regex::{NoExpand, Regex};

/// Renders a campaign message for one contact
pub struct MessageRenderer {
    name: Regex,
    first_name: Regex,
    leftover: Regex,
}

impl MessageRenderer {
    pub fn new() -> Self {
        Self {
            name: Regex::new(r"(?i)\{\{\s*name\s*\}\}").expect("valid name pattern"),
            first_name: Regex::new(r"(?i)\{\{\s*first_name\s*\}\}")
                .expect("valid first_name pattern"),
            leftover: Regex::new(r"\{\{[^}]*\}\}").expect("valid placeholder pattern"),
        }
    }

    /// Render the campaign template for `contact`, call-to-action included
    pub fn render(&self, campaign: &Campaign, contact: &Contact) -> String {
        let mut message = self.render_template(&campaign.message, contact.name.as_deref());

        if let Some(cta) = campaign.call_to_action() {
            message.push_str(&format!("\n\n👉 *{}*\n{}", cta.text, cta.url));
        }

        message
    }

    /// Substitute the name placeholders and drop any others
    pub fn render_template(&self, template: &str, name: Option<&str>) -> String {
        let name = name.map(str::trim).unwrap_or("");
        let first_name = name.split_whitespace().next().unwrap_or("");

        let result = self.name.replace_all(template, NoExpand(name));
        let result = self.first_name.replace_all(&result, NoExpand(first_name));
        self.leftover.replace_all(&result, "").into_owned()
    }
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn campaign(message: &str) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            name: "October promo".to_string(),
            message: message.to_string(),
            image_url: None,
            button_text: None,
            button_url: None,
            status: "draft".to_string(),
            sent_count: 0,
            claim_token: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn contact(name: Option<&str>) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            name: name.map(str::to_string),
            phone: "11999998888".to_string(),
            status: "pending".to_string(),
            error_message: None,
            sent_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_name() {
        let renderer = MessageRenderer::new();
        let result = renderer.render(
            &campaign("Oi {{name}}, corte com 20% off!"),
            &contact(Some("João Silva")),
        );
        assert_eq!(result, "Oi João Silva, corte com 20% off!");
    }

    #[test]
    fn test_render_name_variants() {
        let renderer = MessageRenderer::new();
        let result = renderer.render_template(
            "{{ name }} / {{NAME}} / {{first_name}}",
            Some("Ana Paula"),
        );
        assert_eq!(result, "Ana Paula / Ana Paula / Ana");
    }

    #[test]
    fn test_render_missing_name() {
        let renderer = MessageRenderer::new();
        let result = renderer.render(&campaign("Olá {{name}}!"), &contact(None));
        assert_eq!(result, "Olá !");
    }

    #[test]
    fn test_render_removes_unknown_placeholders() {
        let renderer = MessageRenderer::new();
        let result = renderer.render_template("Hi {{name}}, {{coupon}} today", Some("Rui"));
        assert_eq!(result, "Hi Rui,  today");
    }

    #[test]
    fn test_name_is_not_expanded() {
        let renderer = MessageRenderer::new();
        let result = renderer.render_template("Hi {{name}}", Some("$1 ${name}"));
        assert_eq!(result, "Hi $1 ${name}");
    }

    #[test]
    fn test_render_call_to_action() {
        let renderer = MessageRenderer::new();
        let mut c = campaign("Oi {{name}}");
        c.button_text = Some("Agendar".to_string());
        c.button_url = Some("https://barber.example/agendar".to_string());

        let result = renderer.render(&c, &contact(Some("Leo")));
        assert_eq!(
            result,
            "Oi Leo\n\n👉 *Agendar*\nhttps://barber.example/agendar"
        );
    }

    #[test]
    fn test_partial_call_to_action_is_ignored() {
        let renderer = MessageRenderer::new();
        let mut c = campaign("Oi");
        c.button_text = Some("Agendar".to_string());

        assert_eq!(renderer.render(&c, &contact(None)), "Oi");
    }
}
