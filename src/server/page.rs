//! The single HTML page served for every route.

use std::fmt::Write;

use crate::handler::{COLUMN_ADDRESS, COLUMN_NAME, COLUMN_PHONE, Outcome};
use crate::store::Record;

const HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>User Records</title>
</head>
<body>
<h1>User Records</h1>
<h2>Save User</h2>
<form method="post" action="/save_user">
<label>User ID <input name="user_id" required></label>
<label>Name <input name="name" required></label>
<label>Phone <input name="phone" required></label>
<label>Address <input name="address" required></label>
<button type="submit">Save</button>
</form>
<h2>Get User</h2>
<form method="get" action="/get_user">
<label>User ID <input name="user_id"></label>
<button type="submit">Get</button>
</form>
"#;

const TAIL: &str = "</body>\n</html>\n";

/// Render the page, optionally showing the result of a request
pub fn render(outcome: Option<&Outcome>) -> String {
  let mut html = String::from(HEAD);
  match outcome {
    None => {}
    Some(Outcome::Found(record)) => render_record(&mut html, record),
    Some(outcome @ Outcome::Saved { .. }) => {
      message(&mut html, "saved", outcome.message().as_deref())
    }
    Some(outcome) => message(&mut html, "error", outcome.message().as_deref()),
  }
  html.push_str(TAIL);
  html
}

fn message(html: &mut String, class: &str, text: Option<&str>) {
  if let Some(text) = text {
    let _ = writeln!(html, "<p class=\"{}\">{}</p>", class, escape(text));
  }
}

fn render_record(html: &mut String, record: &Record) {
  html.push_str("<table class=\"data\">\n");
  row(html, "User ID", &record.id);
  row(html, "Partition", &record.partition);
  for (label, column) in [
    ("Name", COLUMN_NAME),
    ("Phone", COLUMN_PHONE),
    ("Address", COLUMN_ADDRESS),
  ] {
    if let Some(value) = record.fields.get(column) {
      row(html, label, value);
    }
  }
  // Columns written by other clients
  for (column, value) in &record.fields {
    if ![COLUMN_NAME, COLUMN_PHONE, COLUMN_ADDRESS].contains(&column.as_str()) {
      row(html, column, value);
    }
  }
  row(html, "Timestamp", &record.timestamp_ms.to_string());
  html.push_str("</table>\n");
}

fn row(html: &mut String, label: &str, value: &str) {
  let _ = writeln!(
    html,
    "<tr><th>{}</th><td>{}</td></tr>",
    escape(label),
    escape(value)
  );
}

/// Escape text for use in HTML element content and attribute values
fn escape(text: &str) -> String {
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
