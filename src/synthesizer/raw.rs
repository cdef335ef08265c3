use crate::types::{LabelStatus, LabeledItem, SubTask};

/// Render the raw quotes appendix.
///
/// Pure function of its inputs: one section per sub-task (in sub-task order)
/// listing every item carrying that label, sorted by score then id. Items
/// with no label are listed in trailing sections so none go unaccounted.
pub fn render_raw_report(question: &str, subtasks: &[SubTask], items: &[LabeledItem]) -> String {
    let mut sorted: Vec<&LabeledItem> = items.iter().collect();
    sorted.sort_by(|a, b| {
        b.item
            .metadata
            .score
            .cmp(&a.item.metadata.score)
            .then_with(|| a.item.id.cmp(&b.item.id))
    });

    let unmatched: Vec<&LabeledItem> = sorted
        .iter()
        .copied()
        .filter(|l| l.status == LabelStatus::Unmatched)
        .collect();
    let failed: Vec<&LabeledItem> = sorted
        .iter()
        .copied()
        .filter(|l| matches!(l.status, LabelStatus::Failed { .. }))
        .collect();
    let labeled = items.len() - unmatched.len() - failed.len();

    let mut content = String::new();

    content.push_str("# Raw Quotes and Labels\n\n");
    content.push_str(&format!("**Question:** {}\n\n", one_line(question)));

    content.push_str("| Metric | Value |\n");
    content.push_str("|--------|-------|\n");
    content.push_str(&format!("| Items | {} |\n", items.len()));
    content.push_str(&format!("| Labeled | {} |\n", labeled));
    content.push_str(&format!("| Unmatched | {} |\n", unmatched.len()));
    content.push_str(&format!("| Labeling failures | {} |\n", failed.len()));
    content.push_str("\n---\n\n");

    for task in subtasks {
        content.push_str(&format!("## {} · {}\n\n", task.id, one_line(&task.title)));
        content.push_str(&format!("_{}_\n\n", one_line(&task.description)));

        let entries: Vec<&LabeledItem> = sorted
            .iter()
            .copied()
            .filter(|l| l.has_label(&task.id))
            .collect();

        if entries.is_empty() {
            content.push_str("*No items*\n\n");
            continue;
        }
        for entry in entries {
            push_entry(&mut content, entry);
        }
    }

    if !unmatched.is_empty() {
        content.push_str("## Unmatched items\n\n");
        for entry in unmatched {
            push_entry(&mut content, entry);
        }
    }

    if !failed.is_empty() {
        content.push_str("## Labeling failures\n\n");
        for entry in failed {
            push_entry(&mut content, entry);
        }
    }

    content
}

fn push_entry(content: &mut String, entry: &LabeledItem) {
    let item = &entry.item;
    let meta = &item.metadata;

    content.push_str(&format!("### [{}] {}\n\n", item.id, one_line(&item.title)));
    content.push_str(&format!("- **Author:** u/{}\n", meta.author));
    content.push_str(&format!("- **Subreddit:** r/{}\n", meta.subreddit));
    content.push_str(&format!(
        "- **Score:** {} · **Comments:** {}\n",
        meta.score, meta.num_comments
    ));
    if let Some(created) = meta.created_utc {
        content.push_str(&format!(
            "- **Posted:** {}\n",
            created.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    if !meta.permalink.is_empty() {
        content.push_str(&format!("- **Link:** https://www.reddit.com{}\n", meta.permalink));
    }
    if !entry.labels.is_empty() {
        let labels: Vec<&str> = entry.labels.iter().map(String::as_str).collect();
        content.push_str(&format!("- **Labels:** {}\n", labels.join(", ")));
    }
    match &entry.status {
        LabelStatus::Failed { error } => {
            content.push_str(&format!("- **Error:** {}\n", one_line(error)));
        }
        _ if !entry.rationale.is_empty() => {
            content.push_str(&format!("- **Rationale:** {}\n", one_line(&entry.rationale)));
        }
        _ => {}
    }
    content.push('\n');

    if let Some(quote) = &entry.quote {
        content.push_str(&format!("**Quote:** \"{}\"\n\n", one_line(quote)));
    }

    for line in item.text().lines() {
        if line.trim().is_empty() {
            content.push_str(">\n");
        } else {
            content.push_str(&format!("> {}\n", line.trim_end()));
        }
    }
    content.push_str("\n---\n\n");
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
