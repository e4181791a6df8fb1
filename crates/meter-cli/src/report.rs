use meter_ledger::PeriodView;
use meter_types::{CalendarDate, MonthKey};

const RULE_WIDTH: usize = 60;

/// Plain-text consumption report of one month.
pub fn render_text(month: MonthKey, generated_on: CalendarDate, unit: &str, view: &PeriodView) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![
        rule.clone(),
        "CONSUMPTION REPORT".to_string(),
        format!("Month: {} {}", month.month_name(), month.year()),
        format!("Generated on: {generated_on}"),
        rule.clone(),
        String::new(),
    ];

    if view.is_empty() {
        lines.push("No records for this period.".to_string());
    } else {
        lines.push(format!(
            "{:<12} | {:>12} | {:>12} | {:>12}",
            "Date", "Reading", "Consumption", "Accumulated"
        ));
        lines.push("-".repeat(RULE_WIDTH));
        for row in &view.rows {
            lines.push(format!(
                "{:<12} | {:>12.2} | {:>12.2} | {:>12.2}",
                row.date.to_string(),
                row.reading,
                row.daily_delta,
                row.running_total
            ));
        }
        lines.push("-".repeat(RULE_WIDTH));
        lines.push(String::new());
        lines.push(format!("TOTAL ACCUMULATED: {:.2} {unit}", view.total));
    }

    lines.push(String::new());
    lines.push(rule);
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Self-contained HTML consumption report of one month.
pub fn render_html(month: MonthKey, generated_on: CalendarDate, unit: &str, view: &PeriodView) -> String {
    let unit = escape(unit);
    let mut html = vec![
        "<!DOCTYPE html>".to_string(),
        "<html>".to_string(),
        "<head>".to_string(),
        "<meta charset='UTF-8'>".to_string(),
        "<style>".to_string(),
        STYLE.to_string(),
        "</style>".to_string(),
        "</head>".to_string(),
        "<body>".to_string(),
        "<div class='container'>".to_string(),
        "<h1>Consumption Report</h1>".to_string(),
        "<div class='info'>".to_string(),
        format!(
            "<p><strong>Month:</strong> {} {}</p>",
            month.month_name(),
            month.year()
        ),
        format!("<p><strong>Generated on:</strong> {generated_on}</p>"),
        "</div>".to_string(),
    ];

    if view.is_empty() {
        html.push("<p class='empty'>No records for this period.</p>".to_string());
    } else {
        html.push("<table>".to_string());
        html.push("<thead>".to_string());
        html.push(format!(
            "<tr><th>Date</th><th class='num'>Reading ({unit})</th>\
             <th class='num'>Consumption ({unit})</th><th class='num'>Accumulated ({unit})</th></tr>"
        ));
        html.push("</thead>".to_string());
        html.push("<tbody>".to_string());
        for row in &view.rows {
            html.push(format!(
                "<tr><td>{}</td><td class='num'>{:.2}</td><td class='num'>{:.2}</td><td class='num'>{:.2}</td></tr>",
                row.date, row.reading, row.daily_delta, row.running_total
            ));
        }
        html.push("</tbody>".to_string());
        html.push("</table>".to_string());
        html.push("<table>".to_string());
        html.push(format!(
            "<tr class='total'><td colspan='3'><strong>TOTAL ACCUMULATED</strong></td>\
             <td class='num'><strong>{:.2} {unit}</strong></td></tr>",
            view.total
        ));
        html.push("</table>".to_string());
    }

    html.push("</div>".to_string());
    html.push("</body>".to_string());
    html.push("</html>".to_string());
    let mut out = html.join("\n");
    out.push('\n');
    out
}

const STYLE: &str = "\
body { font-family: Arial, sans-serif; margin: 20px; background-color: #f5f5f5; }
.container { max-width: 800px; margin: 0 auto; background-color: white; padding: 20px; border-radius: 8px; }
h1 { color: #1976d2; text-align: center; border-bottom: 3px solid #1976d2; padding-bottom: 10px; }
.info { background-color: #e3f2fd; padding: 15px; border-radius: 5px; margin: 20px 0; }
table { width: 100%; border-collapse: collapse; margin: 20px 0; }
th { background-color: #1976d2; color: white; padding: 12px; text-align: left; }
td { padding: 10px; border-bottom: 1px solid #ddd; }
tr:nth-child(even) { background-color: #f9f9f9; }
.total { background-color: #4caf50; color: white; font-size: 18px; }
.num { text-align: right; }
.empty { text-align: center; color: #666; padding: 20px; }";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
