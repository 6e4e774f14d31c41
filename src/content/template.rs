//! Placeholder filling and the HTML email body.

use crate::config::AgencyConfig;
use crate::leads::Lead;

/// Replace `{name}` placeholders with their values. Unknown placeholders are
/// left in place.
pub fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replacement {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Placeholder values for a lead's cold email.
pub fn placeholder_values<'a>(
    lead: &'a Lead,
    agency: &'a AgencyConfig,
    company_description: &'a str,
) -> Vec<(&'static str, &'a str)> {
    vec![
        ("recipient_name", lead.first_name()),
        ("role", lead.role.as_str()),
        ("company", lead.company_name.as_str()),
        ("agency_name", agency.name.as_str()),
        ("agency_info", agency.description.as_str()),
        ("sender_name", agency.sender_name.as_str()),
        ("sender_position", agency.sender_position.as_str()),
        ("agency_website", agency.website.as_str()),
        ("company_description", company_description),
    ]
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// HTML body for a plain-text email: one `<p>` per blank-line separated
/// paragraph, then a booking link and the agency footer.
pub fn render_email_html(body: &str, agency: &AgencyConfig) -> String {
    let normalized = body.replace("\r\n", "\n");
    let paragraphs: String = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let lines: Vec<String> = p.lines().map(html_escape).collect();
            format!("    <p style=\"margin:0 0 16px 0;\">{}</p>\n", lines.join("<br>"))
        })
        .collect();

    let calendar = html_escape(&agency.calendar_link);
    let website = html_escape(&agency.website);
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <body style=\"font-family:Arial,Helvetica,sans-serif;font-size:14px;line-height:1.5;color:#222;\">\n\
         <div style=\"max-width:600px;\">\n\
         {paragraphs}\
             <p style=\"margin:0 0 16px 0;\"><a href=\"{calendar}\">Book a quick call</a></p>\n\
             <p style=\"margin:24px 0 0 0;color:#555;\">{position}, {agency_name}<br><a href=\"{website}\">{website}</a></p>\n\
         </div>\n\
         </body>\n\
         </html>\n",
        position = html_escape(&agency.sender_position),
        agency_name = html_escape(&agency.name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_placeholders_are_filled() {
        let out = fill_placeholders(
            "Hi {recipient_name}, {company} + {unknown} {",
            &[("recipient_name", "Ada"), ("company", "X Corp")],
        );
        assert_eq!(out, "Hi Ada, X Corp + {unknown} {");
    }

    #[test]
    fn lead_placeholders_use_first_name() {
        let mut lead = Lead::new("a@x.com", "Ada Lovelace");
        lead.role = "CTO".into();
        lead.company_name = "X Corp".into();
        let agency = AgencyConfig::default();

        let values = placeholder_values(&lead, &agency, "Builds engines");
        let out = fill_placeholders(
            "{recipient_name} ({role}) at {company}: {company_description}. {sender_name}, {agency_name}",
            &values,
        );
        assert_eq!(out, "Ada (CTO) at X Corp: Builds engines. Krishna, Kuberanix");
    }

    #[test]
    fn html_body_escapes_and_splits_paragraphs() {
        let agency = AgencyConfig::default();
        let html = render_email_html("Hi Ada,\n\nWe <3 engines\nand X & Y.\n\n\n", &agency);

        assert!(html.contains("<p style=\"margin:0 0 16px 0;\">Hi Ada,</p>"));
        assert!(html.contains("We &lt;3 engines<br>and X &amp; Y."));
        assert!(html.contains("https://calendly.com/kuberanix"));
        assert!(html.contains("Business Development Manager, Kuberanix"));
        assert_eq!(html.matches("<p ").count(), 4);
    }
}
