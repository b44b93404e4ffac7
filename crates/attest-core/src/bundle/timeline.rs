//! Deterministic HTML projection of a bundle.

use std::fmt::Write as _;

use super::model::IncidentBundle;

/// Renders the bundle's event timeline as a self-contained HTML document.
///
/// The output is a pure function of the bundle: no clocks, no locale, no
/// iteration-order dependence. Two calls over equal bundles produce
/// byte-identical documents, so the timeline can itself be archived and
/// diffed. Each event row carries its MAC in monospace.
#[must_use]
pub fn html_timeline(bundle: &IncidentBundle) -> String {
    let mut out = String::new();

    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = write!(out, "<title>Incident {}</title>\n", escape(&bundle.id));
    out.push_str(
        "<style>\
         body{font-family:sans-serif}\
         table{border-collapse:collapse}\
         td,th{border:1px solid #999;padding:2px 8px;text-align:left}\
         code{font-family:monospace}\
         </style>\n</head>\n<body>\n",
    );

    let _ = write!(
        out,
        "<h1>Incident {}</h1>\n<p>window {} &ndash; {} ns, {} entries, {} diffs</p>\n",
        escape(&bundle.id),
        bundle.window.start_ns,
        bundle.window.end_ns,
        bundle.logs.len(),
        bundle.diffs.len(),
    );

    out.push_str(
        "<table>\n<tr><th>counter</th><th>timestamp (ns)</th>\
         <th>level</th><th>message</th><th>mac</th></tr>\n",
    );
    for entry in &bundle.logs {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td><code>{}</code></td></tr>\n",
            entry.counter,
            entry.timestamp_ns,
            entry.level.as_str(),
            escape(&entry.message),
            hex::encode(entry.mac),
        );
    }
    out.push_str("</table>\n");

    if !bundle.diffs.is_empty() {
        out.push_str("<h2>Configuration transitions</h2>\n<table>\n<tr><th>version</th><th>committed (ns)</th><th>operation</th><th>state hash</th></tr>\n");
        for record in &bundle.diffs {
            let _ = write!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td><code>{}</code></td></tr>\n",
                escape(&record.version_id),
                record.committed_at_ns,
                record.diff.variant_name(),
                escape(&record.state_hash),
            );
        }
        out.push_str("</table>\n");
    }

    let _ = write!(
        out,
        "<p>seal <code>{}</code></p>\n</body>\n</html>\n",
        hex::encode(bundle.seal)
    );
    out
}

/// Minimal HTML escaping for text content.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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
