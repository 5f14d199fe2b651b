//! Terminal rendering for reports and stored history.

use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets};
use serde_json::Value;
use store::{QueryStatus, ResearchQuery, ResearchResult, timestamp};

use crate::search::SearchHit;

const QUERY_PREVIEW: usize = 60;
const CONTENT_PREVIEW: usize = 80;

/// The report as written, or pretty-printed when it is a JSON document.
pub fn format_report(report: &str) -> String {
    match serde_json::from_str::<Value>(report.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| report.to_string())
        }
        _ => report.trim().to_string(),
    }
}

pub fn format_sources(sources: &[SearchHit]) -> String {
    if sources.is_empty() {
        return "No sources.".to_string();
    }

    let mut out = String::from("Sources:\n");
    for (i, hit) in sources.iter().enumerate() {
        let title = if hit.title.trim().is_empty() {
            hit.url.as_str()
        } else {
            hit.title.as_str()
        };
        match hit.score {
            Some(score) => out.push_str(&format!("{:>3}. {title} ({score:.2})\n", i + 1)),
            None => out.push_str(&format!("{:>3}. {title}\n", i + 1)),
        }
        out.push_str(&format!("     {}\n", hit.url));
    }
    out
}

pub fn query_table(queries: &[ResearchQuery]) -> String {
    if queries.is_empty() {
        return "No research queries found.".to_string();
    }

    let mut table = base_table();
    table.set_header(header(&["ID", "Status", "Query", "Created", "Updated"]));
    for query in queries {
        table.add_row(vec![
            Cell::new(query.id),
            status_cell(query.status),
            Cell::new(truncate(&query.query, QUERY_PREVIEW)),
            Cell::new(timestamp::encode(&query.created_at)),
            Cell::new(timestamp::encode(&query.updated_at)),
        ]);
    }
    table.to_string()
}

/// One query with its stored results.
pub fn query_details(query: &ResearchQuery, results: &[ResearchResult]) -> String {
    let mut out = format!(
        "Query {}: {}\nStatus:  {}\nCreated: {}\nUpdated: {}\n",
        query.id,
        query.query,
        query.status,
        timestamp::encode(&query.created_at),
        timestamp::encode(&query.updated_at),
    );

    if results.is_empty() {
        out.push_str("\nNo results stored.\n");
        return out;
    }

    let mut table = base_table();
    table.set_header(header(&["ID", "Title", "Source", "Relevance", "Content"]));
    for result in results {
        table.add_row(vec![
            Cell::new(result.id),
            Cell::new(&result.title),
            Cell::new(result.source_url.as_deref().unwrap_or("-")),
            Cell::new(
                result
                    .relevance_score
                    .map(|s| format!("{s:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(truncate(&result.content, CONTENT_PREVIEW)),
        ]);
    }
    out.push('\n');
    out.push_str(&table.to_string());
    out.push('\n');
    out
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn status_cell(status: QueryStatus) -> Cell {
    let color = match status {
        QueryStatus::Pending => Color::Yellow,
        QueryStatus::Processing => Color::Cyan,
        QueryStatus::Completed => Color::Green,
        QueryStatus::Failed => Color::Red,
    };
    Cell::new(status).fg(color)
}

/// Single-line preview, cut on a char boundary.
fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn query(id: i64, status: QueryStatus) -> ResearchQuery {
        let now = Utc::now();
        ResearchQuery {
            id,
            query: "What is LangGraph?".to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn json_reports_are_pretty_printed() {
        assert_eq!(format_report(r#"{"summary":"ok"}"#), "{\n  \"summary\": \"ok\"\n}");
        assert_eq!(format_report("  plain text\n"), "plain text");
        // a bare JSON scalar is still just text
        assert_eq!(format_report("42"), "42");
    }

    #[test]
    fn sources_are_numbered_with_scores() {
        let sources = vec![
            SearchHit {
                title: "LangGraph".to_string(),
                url: "https://langchain-ai.github.io/langgraph/".to_string(),
                content: String::new(),
                score: Some(0.9),
                raw_content: None,
            },
            SearchHit {
                title: String::new(),
                url: "https://example.com".to_string(),
                content: String::new(),
                score: None,
                raw_content: None,
            },
        ];
        assert_eq!(
            format_sources(&sources),
            "Sources:\n  1. LangGraph (0.90)\n     https://langchain-ai.github.io/langgraph/\n  2. https://example.com\n     https://example.com\n"
        );
        assert_eq!(format_sources(&[]), "No sources.");
    }

    #[test]
    fn history_table_lists_every_query() {
        let table = query_table(&[query(1, QueryStatus::Completed), query(2, QueryStatus::Failed)]);
        assert!(table.contains("What is LangGraph?"));
        assert!(table.contains("completed"));
        assert!(table.contains("failed"));
        assert_eq!(query_table(&[]), "No research queries found.");
    }

    #[test]
    fn details_show_results() {
        let q = query(3, QueryStatus::Completed);
        let result = ResearchResult {
            id: 9,
            query_id: 3,
            title: "Research report".to_string(),
            content: "LangGraph\nbuilds graphs".to_string(),
            source_url: None,
            relevance_score: None,
            created_at: Utc::now(),
        };
        let details = query_details(&q, &[result]);
        assert!(details.starts_with("Query 3: What is LangGraph?\nStatus:  completed\n"));
        assert!(details.contains("LangGraph builds graphs"));
        assert!(query_details(&q, &[]).ends_with("No results stored.\n"));
    }

    #[test]
    fn previews_cut_on_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("short", 8), "short");
    }
}
