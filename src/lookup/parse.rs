use std::sync::LazyLock;

use regex::Regex;

use super::{Interaction, LookupOutcome, Severity};

static WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<div\b[^>]*\bclass\s*=\s*"interactions-reference-wrapper"[^>]*>"#).unwrap()
});
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<div\b[^>]*\bclass\s*=\s*"interactions-reference-header"[^>]*>"#).unwrap()
});
static DIV_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<(/?)div\b[^>]*>").unwrap());
static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<span\b[^>]*\bclass\s*=\s*"ddc-status-label status-category-(major|moderate|minor)"[^>]*>([^<]*)"#,
    )
    .unwrap()
});
static H3_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h3\b[^>]*>(.*?)</h3>").unwrap());
static P_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const NO_DESCRIPTION: &str = "No description available.";
const NSAID_CLASS: &str = "Nonsteroidal anti-inflammatories";

/// Turn an interaction-checker result page into an outcome.
///
/// Only the first reference block that carries a header is looked at.
/// Anything that does not match the expected layout is `NoInteraction`.
pub fn parse_interactions(html: &str) -> LookupOutcome {
    let opens: Vec<(usize, usize)> = WRAPPER_RE
        .find_iter(html)
        .map(|m| (m.start(), m.end()))
        .collect();

    for (i, &(start, open_end)) in opens.iter().enumerate() {
        let next = opens.get(i + 1).map(|o| o.0).unwrap_or(html.len());
        let end = element_end(html, open_end).min(next);
        let wrapper = &html[start..end];

        let Some(header_open) = HEADER_RE.find(wrapper) else {
            continue;
        };
        let header_end = element_end(wrapper, header_open.end());
        let header = &wrapper[header_open.end()..header_end];

        let severity = severity_of(header);
        let involved = H3_RE
            .captures_iter(header)
            .map(|c| text_of(&c[1]))
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        if is_excluded(&involved) {
            return LookupOutcome::Excluded;
        }

        let description = P_RE
            .captures(wrapper)
            .map(|c| text_of(&c[1]))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_DESCRIPTION.to_string());

        return LookupOutcome::Interaction(Interaction {
            severity,
            involved,
            description,
        });
    }

    LookupOutcome::NoInteraction
}

/// Header text about food or the NSAID class is not a drug-drug match.
pub fn is_excluded(involved: &str) -> bool {
    involved.to_lowercase().contains("food") || involved.contains(NSAID_CLASS)
}

fn severity_of(header: &str) -> Severity {
    let (mut major, mut moderate, mut minor) = (false, false, false);
    for caps in STATUS_RE.captures_iter(header) {
        if caps[2].trim().is_empty() {
            continue;
        }
        match caps[1].to_ascii_lowercase().as_str() {
            "major" => major = true,
            "moderate" => moderate = true,
            _ => minor = true,
        }
    }
    if major {
        Severity::Major
    } else if moderate {
        Severity::Moderate
    } else if minor {
        Severity::Minor
    } else {
        Severity::Unknown
    }
}

/// Offset of the `</div>` closing the element whose open tag ends at `from`.
fn element_end(html: &str, from: usize) -> usize {
    let mut depth = 1usize;
    for caps in DIV_TAG_RE.captures_iter(&html[from..]) {
        if caps[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                let m = caps.get(0).map(|m| m.start()).unwrap_or(0);
                return from + m;
            }
        }
    }
    html.len()
}

fn text_of(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    SPACE_RE.replace_all(decoded.trim(), " ").to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&harr;", "↔")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
