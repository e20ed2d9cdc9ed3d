//! Email body rendering.
//!
//! [`TemplateRenderer`] turns a template name plus JSON context into text
//! and HTML bodies. [`BasicTemplateRenderer`] covers the two discussion
//! templates with plain formatting.

use serde_json::Value;

use super::{DeliveryError, EmailTemplate};

/// Rendered bodies for a multipart/alternative message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub text: String,
    pub html: String,
}

/// Renders a template with a context.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: EmailTemplate, context: &Value) -> Result<RenderedEmail, DeliveryError>;
}

/// Minimal renderer producing plain text and simple escaped HTML.
#[derive(Debug, Default, Clone)]
pub struct BasicTemplateRenderer;

impl TemplateRenderer for BasicTemplateRenderer {
    fn render(&self, template: EmailTemplate, context: &Value) -> Result<RenderedEmail, DeliveryError> {
        match template {
            EmailTemplate::DiscussionNotification => render_notification(context),
            EmailTemplate::DiscussionDigest => render_digest(context),
        }
    }
}

fn field<'a>(context: &'a Value, key: &str) -> Result<&'a str, DeliveryError> {
    context
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| DeliveryError::Render(format!("missing context field `{key}`")))
}

fn render_notification(context: &Value) -> Result<RenderedEmail, DeliveryError> {
    let recipient = field(context, "recipient_name")?;
    let author = field(context, "author_name")?;
    let project = field(context, "project_title")?;
    let body = field(context, "comment_body")?;
    let url = field(context, "discussion_url")?;

    let text = format!(
        "Hi {recipient},\n\n{author} commented on {project}:\n\n{body}\n\nView the discussion: {url}\n"
    );
    let html = format!(
        "<p>Hi {},</p><p><strong>{}</strong> commented on <strong>{}</strong>:</p>\
         <blockquote>{}</blockquote><p><a href=\"{}\">View the discussion</a></p>",
        escape_html(recipient),
        escape_html(author),
        escape_html(project),
        escape_html(body),
        escape_html(url),
    );

    Ok(RenderedEmail { text, html })
}

fn render_digest(context: &Value) -> Result<RenderedEmail, DeliveryError> {
    let recipient = field(context, "recipient_name")?;
    let site_url = field(context, "site_url")?;
    let groups = context
        .get("groups")
        .and_then(Value::as_array)
        .ok_or_else(|| DeliveryError::Render("missing context field `groups`".into()))?;

    let mut text = format!("Hi {recipient},\n\nHere is what you missed:\n");
    let mut html = format!("<p>Hi {},</p><p>Here is what you missed:</p>", escape_html(recipient));

    for group in groups {
        let project = field(group, "project_title")?;
        text.push_str(&format!("\n{project}\n"));
        html.push_str(&format!("<h3>{}</h3><ul>", escape_html(project)));

        for comment in group.get("comments").and_then(Value::as_array).into_iter().flatten() {
            let author = field(comment, "author_name")?;
            let body = field(comment, "body")?;
            text.push_str(&format!("  - {author}: {body}\n"));
            html.push_str(&format!(
                "<li><strong>{}</strong>: {}</li>",
                escape_html(author),
                escape_html(body)
            ));
        }
        html.push_str("</ul>");
    }

    text.push_str(&format!("\nSee all discussions: {site_url}\n"));
    html.push_str(&format!(
        "<p><a href=\"{}\">See all discussions</a></p>",
        escape_html(site_url)
    ));

    Ok(RenderedEmail { text, html })
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
