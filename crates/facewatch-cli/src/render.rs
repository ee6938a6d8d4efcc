//! Plain-text rendering of the daemon's JSON replies.

use serde_json::Value;

fn number(v: &Value) -> Option<f64> {
    v.as_f64()
}

/// Lines for one `Annotations` snapshot: a line per face, a line per object
/// class, then the face total.
pub fn render_annotations(annotations: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let faces = annotations["faces"].as_array().map(Vec::as_slice).unwrap_or_default();

    for face in faces {
        let label = face["label"].as_str().unwrap_or("Unknown");
        let age = number(&face["age"]).map(|a| format!("{:.0}", a)).unwrap_or_else(|| "-".into());
        let gender = face["gender"].as_str().unwrap_or("-");
        let mut line = format!("{label} || {age} || {gender}");
        if let Some(expression) = face["expression"].as_str() {
            line.push_str(&format!(" || {expression}"));
        }
        if let Some(distance) = number(&face["distance"]) {
            line.push_str(&format!("  (distance {distance:.3})"));
        }
        lines.push(line);
    }

    if let Some(counts) = annotations["object_counts"].as_object() {
        for (label, count) in counts {
            lines.push(format!("Detected {label}: {count}"));
        }
    }

    lines.push(format!("Detected Face: {}", faces.len()));
    lines
}

pub fn describe_enroll(outcome: &Value, name: &str) -> String {
    match (outcome["outcome"].as_str(), outcome["state"].as_str()) {
        (Some("inserted"), _) => format!("Enrolled {name} as face {}", outcome["id"]),
        (Some("replaced"), _) => format!(
            "Updated face {} (was {}) with a new capture of {name}",
            outcome["id"],
            outcome["previous_name"].as_str().unwrap_or("?")
        ),
        (_, Some("ready_to_submit")) => format!(
            "Gallery is full ({} faces); run `facewatch submit` to send it to the server",
            outcome["enrolled"]
        ),
        _ => outcome.to_string(),
    }
}

pub fn render_face_list(faces: &Value) -> Vec<String> {
    let faces = faces.as_array().map(Vec::as_slice).unwrap_or_default();
    if faces.is_empty() {
        return vec!["No faces enrolled".to_string()];
    }
    let mut lines = vec![format!("{:<6} {:<24} {}", "ID", "NAME", "DIM")];
    for face in faces {
        lines.push(format!(
            "{:<6} {:<24} {}",
            face["id"].to_string(),
            face["name"].as_str().unwrap_or(""),
            face["dimension"]
        ));
    }
    lines
}

/// Whether a face list reply contains `id`.
pub fn contains_face(faces: &Value, id: u32) -> bool {
    faces
        .as_array()
        .is_some_and(|list| list.iter().any(|f| f["id"].as_u64() == Some(u64::from(id))))
}
