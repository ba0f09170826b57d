//! Built-in message bodies used when the host supplies no templates.

use std::collections::HashMap;

pub const VERIFICATION_CODE_SUBJECT: &str = "Verification code";
pub const NEW_LOGIN_SUBJECT: &str = "New login";

pub const VERIFICATION_CODE_TEMPLATE: &str = "verification_code";
pub const NEW_LOGIN_TEMPLATE: &str = "new_login";

pub fn verification_code_html(username: &str, code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{subject}</title></head>
<body>
  <p>Hello {username},</p>
  <p>Use this code to finish signing in:</p>
  <p style="font-size:28px;font-weight:bold;letter-spacing:6px;">{code}</p>
  <p>If you did not try to sign in you can ignore this email.</p>
</body>
</html>"#,
        subject = VERIFICATION_CODE_SUBJECT,
        username = username,
        code = code,
    )
}

pub fn new_login_html(username: &str, ip: &str, device: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{subject}</title></head>
<body>
  <p>Hello {username},</p>
  <p>Your account was just used to sign in.</p>
  <ul>
    <li>IP address: {ip}</li>
    <li>Device: {device}</li>
  </ul>
  <p>If this was not you, sign out of all devices and contact support.</p>
</body>
</html>"#,
        subject = NEW_LOGIN_SUBJECT,
        username = username,
        ip = ip,
        device = device,
    )
}

/// Title, body and data payload of the new login push.
pub fn new_login_push(
    username: &str,
    ip: &str,
    device: &str,
    device_id: &str,
) -> (String, String, HashMap<String, String>) {
    let title = format!("New login {}", username);
    let body = format!("New sign in from {} ({})", device, ip);

    let mut data = HashMap::new();
    data.insert("type".to_string(), "login".to_string());
    data.insert("ip".to_string(), ip.to_string());
    data.insert("device".to_string(), device.to_string());
    data.insert("device_id".to_string(), device_id.to_string());

    (title, body, data)
}

/// Insert `footer` right before `</body>`, or append it when the document has none.
pub fn with_footer(html: &str, footer: &str) -> String {
    match html.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], footer, &html[idx..]),
        None => format!("{}{}", html, footer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_footer_before_body_close() {
        let html = "<html><body><p>hi</p></body></html>";
        assert_eq!(
            with_footer(html, "<small>f</small>"),
            "<html><body><p>hi</p><small>f</small></body></html>"
        );
        assert_eq!(with_footer("plain", "!"), "plain!");
    }

    #[test]
    fn test_new_login_push_payload() {
        let (title, _, data) = new_login_push("alice", "10.0.0.1", "Pixel", "abc");
        assert_eq!(title, "New login alice");
        assert_eq!(data["type"], "login");
        assert_eq!(data["ip"], "10.0.0.1");
        assert_eq!(data["device"], "Pixel");
        assert_eq!(data["device_id"], "abc");
    }

    #[test]
    fn test_code_email_contains_code() {
        assert!(verification_code_html("alice", "482913").contains("482913"));
    }
}
