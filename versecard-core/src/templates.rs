//! Fallback Template - Deterministic Card Markup
//!
//! Used whenever the generator yields no markup. Pure, no I/O: the same
//! verse always produces the same bytes.

use serde::{Deserialize, Serialize};

use crate::{CANVAS_SIZE, FOOTER_LABEL};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackTemplate {
    pub canvas_size: u32,
    pub font_family: String,
    pub font_href: String,
    pub gradient: [String; 2],
    pub footer: String,
}

impl Default for FallbackTemplate {
    fn default() -> Self {
        Self {
            canvas_size: CANVAS_SIZE,
            font_family: "Merriweather".to_string(),
            font_href: "https://fonts.googleapis.com/css2?family=Merriweather:wght@400;700&display=swap".to_string(),
            gradient: ["#f5f7fa".to_string(), "#c3cfe2".to_string()],
            footer: FOOTER_LABEL.to_string(),
        }
    }
}

impl FallbackTemplate {
    pub fn build(&self, verse_text: &str, reference: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <link href="{font_href}" rel="stylesheet">
    <style>
        body, html {{
            margin: 0;
            padding: 0;
            width: {size}px;
            height: {size}px;
            overflow: hidden;
        }}
        .container {{
            position: relative;
            width: 100%;
            height: 100%;
            display: flex;
            flex-direction: column;
            justify-content: center;
            align-items: center;
            background: linear-gradient(135deg, {from} 0%, {to} 100%);
            padding: 40px;
            box-sizing: border-box;
        }}
        .verse {{
            font-family: '{font}', serif;
            font-size: 48px;
            line-height: 1.4;
            color: #333;
            text-align: center;
            max-width: 90%;
            margin-bottom: 30px;
        }}
        .reference {{
            font-family: '{font}', serif;
            font-size: 32px;
            color: #555;
            text-align: center;
        }}
        .footer {{
            position: absolute;
            bottom: 30px;
            font-family: 'Arial', sans-serif;
            font-size: 24px;
            color: rgba(0,0,0,0.5);
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="verse">{verse}</div>
        <div class="reference">{reference}</div>
        <div class="footer">{footer}</div>
    </div>
</body>
</html>
"#,
            font_href = escape_html(&self.font_href),
            size = self.canvas_size,
            from = self.gradient[0],
            to = self.gradient[1],
            font = self.font_family,
            verse = escape_html(verse_text),
            reference = escape_html(reference),
            footer = escape_html(&self.footer),
        )
    }
}

/// Build the default fallback card.
pub fn build_fallback(verse_text: &str, reference: &str) -> String {
    FallbackTemplate::default().build(verse_text, reference)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
