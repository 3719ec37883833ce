/// Render rows as a Markdown table. The first row becomes the header and a
/// `---` separator row is inserted after it. Newlines inside cells are flattened.
pub fn table_to_markdown<S: AsRef<str>>(rows: &[Vec<S>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.as_ref().trim().replace('\n', " ")).collect();
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            lines.push(format!("| {} |", vec!["---"; cells.len()].join(" | ")));
        }
    }
    lines.join("\n").trim().to_string()
}
