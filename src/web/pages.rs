//! HTML pages
//!
//! Both pages are small enough to be rendered inline.

const STYLE: &str = r#"<style>
body { font-family: sans-serif; background: #1e1e1e; color: #eee; margin: 0; padding: 1em; }
h1 { font-size: 1.4em; }
.grid { display: flex; flex-wrap: wrap; gap: 1em; }
.tile { background: #2b2b2b; padding: 0.5em; border-radius: 4px; }
.tile img { display: block; max-width: 100%; }
form { display: flex; flex-direction: column; gap: 0.5em; max-width: 20em; }
.error { color: #ff6b6b; }
a { color: #8ab4f8; }
</style>"#;

/// Escape text for use in HTML content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Stream overview, one tile per topic
pub fn index_page(topics: &[String], show_logout: bool) -> String {
    let tiles: String = topics
        .iter()
        .map(|topic| {
            let topic = escape_html(topic);
            format!(
                r#"<div class="tile"><h2>{topic}</h2><a href="/{topic}"><img src="/{topic}" alt="{topic}"></a></div>"#
            )
        })
        .collect();
    let logout = if show_logout {
        r#"<p><a href="/logout">Logout</a></p>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Detection Visualizer</title>{STYLE}</head>
<body>
<h1>Detection Visualizer</h1>
{logout}
<div class="grid">{tiles}</div>
</body>
</html>"#
    )
}

/// Login form, with an optional error line
pub fn login_page(message: Option<&str>) -> String {
    let message = message
        .map(|m| format!(r#"<p class="error">{}</p>"#, escape_html(m)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Login</title>{STYLE}</head>
<body>
<h1>Login</h1>
{message}
<form method="post" action="/login">
<input type="text" name="username" placeholder="Username" autocomplete="username" required>
<input type="password" name="password" placeholder="Password" autocomplete="current-password" required>
<button type="submit">Login</button>
</form>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_pages() {
        let index = index_page(&["camera1".to_string(), "camera2".to_string()], true);
        assert!(index.contains(r#"<img src="/camera1""#));
        assert!(index.contains(r#"<img src="/camera2""#));
        assert!(index.contains("/logout"));
        assert!(!index_page(&[], false).contains("/logout"));

        let login = login_page(Some("Invalid Login"));
        assert!(login.contains(r#"<p class="error">Invalid Login</p>"#));
        assert!(login.contains(r#"name="password""#));
        assert!(!login_page(None).contains("error\">"));
    }
}
