//! Email bodies
//!
//! Each template returns a complete [`EmailMessage`]. Values interpolated
//! into HTML are escaped.

use super::EmailMessage;

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(body: &str) -> String {
    format!(
        "<!doctype html><html><body style=\"font-family: sans-serif; line-height: 1.5\">{}\
         <p style=\"color: #888; font-size: 12px\">Sent by Keystone</p></body></html>",
        body
    )
}

fn button(url: &str, label: &str) -> String {
    format!(
        "<p><a href=\"{}\" style=\"background: #111; color: #fff; padding: 8px 16px; \
         border-radius: 4px; text-decoration: none\">{}</a></p>",
        escape(url),
        escape(label)
    )
}

pub fn welcome(to: &str, name: &str, app_url: &str) -> EmailMessage {
    let dashboard = format!("{}/dashboard", app_url.trim_end_matches('/'));

    EmailMessage {
        to: to.to_string(),
        subject: "Welcome to Keystone".to_string(),
        html: layout(&format!(
            "<h1>Welcome, {}!</h1><p>Your account and personal workspace are ready.</p>{}",
            escape(name),
            button(&dashboard, "Open your dashboard")
        )),
        text: format!(
            "Welcome, {}!\n\nYour account and personal workspace are ready.\n\nOpen your dashboard: {}\n",
            name, dashboard
        ),
    }
}

/// Nudge for users who signed up but never created a project
pub fn follow_up(to: &str, name: &str, app_url: &str) -> EmailMessage {
    let new_project = format!("{}/projects/new", app_url.trim_end_matches('/'));

    EmailMessage {
        to: to.to_string(),
        subject: "Ready to start your first project?".to_string(),
        html: layout(&format!(
            "<p>Hi {},</p><p>You haven't created a project yet. Projects keep your team's \
             tasks in one place, and it only takes a minute to set one up.</p>{}",
            escape(name),
            button(&new_project, "Create a project")
        )),
        text: format!(
            "Hi {},\n\nYou haven't created a project yet. Projects keep your team's tasks in one \
             place, and it only takes a minute to set one up.\n\nCreate a project: {}\n",
            name, new_project
        ),
    }
}

pub fn invitation(
    to: &str,
    organization_name: &str,
    inviter_name: &str,
    role: &str,
    accept_url: &str,
) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("You've been invited to join {}", organization_name),
        html: layout(&format!(
            "<p>{} invited you to join <strong>{}</strong> as {}.</p>{}\
             <p>This invitation expires in 7 days.</p>",
            escape(inviter_name),
            escape(organization_name),
            escape(role),
            button(accept_url, "Accept invitation")
        )),
        text: format!(
            "{} invited you to join {} as {}.\n\nAccept the invitation: {}\n\nThis invitation expires in 7 days.\n",
            inviter_name, organization_name, role, accept_url
        ),
    }
}

pub fn subscription_changed(
    to: &str,
    organization_name: &str,
    plan_name: &str,
    status: &str,
) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Subscription update for {}", organization_name),
        html: layout(&format!(
            "<p>The subscription for <strong>{}</strong> is now <strong>{}</strong> on the {} plan.</p>",
            escape(organization_name),
            escape(status),
            escape(plan_name)
        )),
        text: format!(
            "The subscription for {} is now {} on the {} plan.\n",
            organization_name, status, plan_name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"Tom\" & 'Jerry'</b>"), "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_welcome() {
        let msg = welcome("ada@example.com", "Ada", "https://app.example.com/");
        assert_eq!(msg.to, "ada@example.com");
        assert!(msg.html.contains("Welcome, Ada!"));
        assert!(msg.text.contains("https://app.example.com/dashboard"));
    }

    #[test]
    fn test_names_are_escaped_in_html_only() {
        let msg = follow_up("x@example.com", "<script>", "https://app.example.com");
        assert!(msg.html.contains("&lt;script&gt;"));
        assert!(!msg.html.contains("<script>"));
        assert!(msg.text.contains("<script>"));
    }

    #[test]
    fn test_invitation() {
        let msg = invitation(
            "new@example.com",
            "Acme",
            "Ada",
            "member",
            "https://app.example.com/invitations/accept?token=inv_abc",
        );
        assert_eq!(msg.subject, "You've been invited to join Acme");
        assert!(msg.text.contains("token=inv_abc"));
        assert!(msg.html.contains("as member"));
    }

    #[test]
    fn test_subscription_changed() {
        let msg = subscription_changed("o@example.com", "Acme", "Pro", "active");
        assert!(msg.text.contains("now active on the Pro plan"));
    }
}
