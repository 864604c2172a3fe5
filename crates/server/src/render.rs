use std::fmt::Write as _;

use serde_json::{Map, Value};
use shared::{
    domain::RecordId,
    naming::{humanize, QuickCreateButton},
    protocol::FieldSpec,
};
use storage::StoredRecord;

use crate::admin::{display_value, AdminEntities, AdminEntity};

/// Existing records offered by one relation's select box.
pub(crate) struct RelationChoices<'a> {
    pub(crate) spec: &'a FieldSpec,
    pub(crate) records: Vec<StoredRecord>,
}

pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Host-wide inputs shared by every page.
pub(crate) struct Chrome<'a> {
    /// Path prefix of every admin link, ending in `/`.
    pub(crate) base_path: &'a str,
    pub(crate) workflow_active: bool,
    pub(crate) entities: &'a AdminEntities,
}

fn layout(title: &str, chrome: &Chrome<'_>, body: &str) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head><body>\n",
        escape(title)
    );
    if chrome.workflow_active {
        // Navigating to another module mid-workflow would abandon it.
        html.push_str("<p class=\"quick-create-banner\">Quick create in progress</p>\n");
    } else {
        html.push_str("<nav>");
        for entity in chrome.entities.iter() {
            let _ = write!(
                html,
                "<a href=\"{base}{module}\">{label}</a> ",
                base = escape(chrome.base_path),
                module = escape(&entity.module),
                label = escape(entity.entity_type.as_str())
            );
        }
        html.push_str("</nav>\n");
    }
    let _ = write!(html, "<h1>{}</h1>\n{body}</body></html>\n", escape(title));
    html
}

fn record_label(record: &StoredRecord) -> String {
    match record.field_str("name") {
        Some(name) if !name.is_empty() => format!("{name} (#{})", record.id),
        _ => format!("{} #{}", record.entity_type, record.id),
    }
}

pub(crate) fn list_page(
    entity: &AdminEntity,
    records: &[StoredRecord],
    chrome: &Chrome<'_>,
) -> String {
    let base = escape(chrome.base_path);
    let module = escape(&entity.module);
    let mut body = String::new();
    let _ = writeln!(body, "<p><a href=\"{base}{module}/edit\">Create</a></p>");
    body.push_str("<table>\n<tr><th>id</th>");
    for column in &entity.columns {
        let _ = write!(body, "<th>{}</th>", escape(&humanize(column)));
    }
    body.push_str("</tr>\n");
    for record in records {
        let _ = write!(
            body,
            "<tr><td><a href=\"{base}{module}/edit?id={id}\">{id}</a></td>",
            id = record.id
        );
        for column in &entity.columns {
            let _ = write!(
                body,
                "<td>{}</td>",
                escape(&display_value(record.fields.get(column)))
            );
        }
        body.push_str("</tr>\n");
    }
    body.push_str("</table>\n");

    layout(&format!("{} list", entity.entity_type), chrome, &body)
}

pub(crate) fn edit_page(
    entity: &AdminEntity,
    id: Option<RecordId>,
    values: &Map<String, Value>,
    relations: &[RelationChoices<'_>],
    chrome: &Chrome<'_>,
) -> String {
    let key = entity.form_key();
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<form method=\"post\" action=\"{}{}/edit\">",
        escape(chrome.base_path),
        escape(&entity.module)
    );
    if let Some(id) = id {
        let _ = writeln!(body, "<input type=\"hidden\" name=\"id\" value=\"{id}\">");
    }

    for column in &entity.columns {
        let _ = writeln!(
            body,
            "<label>{label} <input type=\"text\" name=\"{key}[{name}]\" value=\"{value}\"></label><br>",
            label = escape(&humanize(column)),
            key = escape(&key),
            name = escape(column),
            value = escape(&display_value(values.get(column))),
        );
    }

    for choices in relations {
        let field = choices.spec.field();
        let selected = display_value(values.get(&field));
        let _ = write!(
            body,
            "<label>{label} <select name=\"{key}[{name}]\"><option value=\"\"></option>",
            label = escape(&humanize(&field)),
            key = escape(&key),
            name = escape(&field),
        );
        for record in &choices.records {
            let value = record.id.to_string();
            let _ = write!(
                body,
                "<option value=\"{value}\"{selected}>{label}</option>",
                selected = if value == selected { " selected" } else { "" },
                label = escape(&record_label(record)),
            );
        }
        body.push_str("</select></label> or ");

        let button = QuickCreateButton::new(&choices.spec.entity_type, Some(&field));
        let _ = writeln!(
            body,
            "<input type=\"submit\" name=\"{name}\" id=\"{id}\" class=\"{class}\" value=\"{label}\"><br>",
            name = escape(&button.name),
            id = escape(&button.id),
            class = escape(&button.class),
            label = escape(&button.label),
        );
    }

    body.push_str("<input type=\"submit\" name=\"save\" value=\"Save\">\n");
    body.push_str("<input type=\"submit\" name=\"save_and_list\" value=\"Save and list\">\n");
    body.push_str("</form>\n");

    let title = match id {
        Some(id) => format!("Edit {} #{id}", entity.entity_type),
        None => format!("New {}", entity.entity_type),
    };
    layout(&title, chrome, &body)
}
