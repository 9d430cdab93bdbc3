//! HTML pages for browser clients.

use axum::http::StatusCode;
use datepoll_core::{Appointment, BallotState, FieldErrors, Vote};
use uuid::Uuid;

use crate::votes::VoteSubmission;

/// Escape text for use in HTML content and attribute values
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn vote_path(id: Uuid) -> String {
    format!("/appointment_votes/{id}")
}

fn layout(title: &str, notice: Option<&str>, body: &str) -> String {
    let notice = notice
        .map(|n| format!(r#"<p id="notice">{}</p>"#, escape(n)))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{}</title>
</head>
<body>
    {notice}
    {body}
</body>
</html>"#,
        escape(title)
    )
}

fn error_explanation(errors: &FieldErrors) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let messages = errors.full_messages();
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", escape(m)))
        .collect();
    let noun = if messages.len() == 1 { "error" } else { "errors" };
    format!(
        r#"<div id="error_explanation">
    <h2>{} {noun} prohibited this appointment vote from being saved:</h2>
    <ul>{items}</ul>
</div>"#,
        messages.len()
    )
}

fn time_label(appointment: Option<&Appointment>, time_id: Uuid) -> String {
    appointment
        .and_then(|a| a.times.iter().find(|t| t.id == time_id))
        .map(|t| t.starts_at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| time_id.to_string())
}

pub fn index(votes: &[Vote], notice: Option<&str>) -> String {
    let rows: String = votes
        .iter()
        .map(|vote| {
            let yes = vote
                .ballots
                .iter()
                .filter(|b| b.state == BallotState::Yes)
                .count();
            format!(
                r#"<tr><td>{}</td><td>{}</td><td>{}</td><td>{yes}/{}</td><td><a href="{path}">Show</a> <a href="{path}/edit">Edit</a></td></tr>"#,
                escape(&vote.user.username),
                vote.appointment_id,
                escape(vote.state.as_deref().unwrap_or("")),
                vote.ballots.len(),
                path = vote_path(vote.id),
            )
        })
        .collect();

    layout(
        "Appointment Votes",
        notice,
        &format!(
            r#"<h1>Appointment Votes</h1>
<table>
    <thead><tr><th>User</th><th>Appointment</th><th>State</th><th>Yes</th><th></th></tr></thead>
    <tbody>{rows}</tbody>
</table>"#
        ),
    )
}

pub fn show(vote: &Vote, appointment: Option<&Appointment>, notice: Option<&str>) -> String {
    let ballots: String = vote
        .ballots
        .iter()
        .map(|b| {
            format!(
                r#"<li class="{state}">{}: {state}</li>"#,
                escape(&time_label(appointment, b.appointment_time_id)),
                state = b.state,
            )
        })
        .collect();
    let title = appointment
        .map(|a| escape(&a.title))
        .unwrap_or_else(|| vote.appointment_id.to_string());

    layout(
        "Appointment Vote",
        notice,
        &format!(
            r#"<p><strong>User:</strong> {}</p>
<p><strong>Appointment:</strong> {title}</p>
<p><strong>State:</strong> {}</p>
<ul>{ballots}</ul>
<form action="{path}" method="post">
    <input type="hidden" name="_method" value="delete">
    <label for="auth_token">Token</label>
    <input type="password" id="auth_token" name="auth_token">
    <input type="submit" value="Destroy">
</form>
<a href="{path}/edit">Edit</a> | <a href="/appointment_votes">Back</a>"#,
            escape(&vote.user.username),
            escape(vote.state.as_deref().unwrap_or("")),
            path = vote_path(vote.id),
        ),
    )
}

pub fn edit(vote: &Vote, errors: &FieldErrors) -> String {
    layout(
        "Editing Appointment Vote",
        None,
        &format!(
            r#"<h1>Editing Appointment Vote</h1>
{}
<form action="{path}" method="post">
    <input type="hidden" name="_method" value="patch">
    <label for="appointment_vote_state">State</label>
    <input type="text" id="appointment_vote_state" name="appointment_vote[state]" value="{}">
    <label for="appointment_vote_appointment_id">Appointment</label>
    <input type="text" id="appointment_vote_appointment_id" name="appointment_vote[appointment_id]" value="{}">
    <label for="appointment_vote_user_id">User</label>
    <input type="text" id="appointment_vote_user_id" name="appointment_vote[user_id]" value="{}">
    <label for="auth_token">Token</label>
    <input type="password" id="auth_token" name="auth_token">
    <input type="submit" value="Update Appointment vote">
</form>
<a href="{path}">Show</a> | <a href="/appointment_votes">Back</a>"#,
            error_explanation(errors),
            escape(vote.state.as_deref().unwrap_or("")),
            vote.appointment_id,
            vote.user.id,
            path = vote_path(vote.id),
        ),
    )
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    layout(
        reason,
        None,
        &format!(
            r#"<h1>{} {}</h1>
<p>{}</p>
<a href="/appointment_votes">Back</a>"#,
            status.as_u16(),
            escape(reason),
            escape(message),
        ),
    )
}

/// Form shown again after a rejected submission
pub fn new_vote(
    submission: &VoteSubmission,
    appointment: Option<&Appointment>,
    errors: &FieldErrors,
) -> String {
    let choices: String = appointment
        .map(|a| {
            a.times
                .iter()
                .map(|t| {
                    let checked = if submission.choices.contains(&t.id) {
                        " checked"
                    } else {
                        ""
                    };
                    format!(
                        r#"<label><input type="checkbox" name="choices[]" value="{}"{checked}> {}</label>"#,
                        t.id,
                        escape(&time_label(appointment, t.id)),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    layout(
        "New Appointment Vote",
        None,
        &format!(
            r#"<h1>New Appointment Vote</h1>
{}
<form action="/appointment_votes" method="post">
    <input type="hidden" name="appointment_id" value="{}">
    <label for="username">Name</label>
    <input type="text" id="username" name="username" value="{}">
    {choices}
    <input type="submit" value="Create Appointment vote">
</form>
<a href="/appointment_votes">Back</a>"#,
            error_explanation(errors),
            submission.appointment_id,
            escape(&submission.username),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datepoll_core::{AppointmentTime, AuthToken, Ballot, User};

    fn sample() -> (Vote, Appointment) {
        let now = Utc::now();
        let appointment_id = Uuid::new_v4();
        let time = AppointmentTime {
            id: Uuid::new_v4(),
            appointment_id,
            position: 0,
            starts_at: now,
        };
        let vote = Vote {
            id: Uuid::new_v4(),
            user: User {
                id: Uuid::new_v4(),
                username: "<script>alert(1)</script>".into(),
                created_at: now,
            },
            appointment_id,
            state: Some("maybe & more".into()),
            auth_token: AuthToken::generate(),
            ballots: vec![Ballot {
                id: Uuid::new_v4(),
                appointment_time_id: time.id,
                state: BallotState::Yes,
            }],
            created_at: now,
            updated_at: now,
        };
        let appointment = Appointment {
            id: appointment_id,
            title: "Dinner".into(),
            created_at: now,
            times: vec![time],
        };
        (vote, appointment)
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_show_escapes_user_content() {
        let (vote, appointment) = sample();
        let html = show(&vote, Some(&appointment), Some("Appointment vote was successfully created."));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("maybe &amp; more"));
        assert!(html.contains(r#"<p id="notice">Appointment vote was successfully created.</p>"#));
        assert!(html.contains("Dinner"));
        assert!(!html.contains(vote.auth_token.as_str()));
    }

    #[test]
    fn test_index_lists_votes() {
        let (vote, _) = sample();
        let html = index(std::slice::from_ref(&vote), None);
        assert!(html.contains(&vote_path(vote.id)));
        assert!(html.contains("1/1"));
    }

    #[test]
    fn test_new_vote_renders_errors_and_choices() {
        let (_, appointment) = sample();
        let submission = VoteSubmission {
            username: "x".repeat(300),
            appointment_id: appointment.id,
            choices: [appointment.times[0].id].into_iter().collect(),
        };
        let errors = FieldErrors::single("username", "is too long (maximum is 255 characters)");

        let html = new_vote(&submission, Some(&appointment), &errors);

        assert!(html.contains("1 error prohibited this appointment vote from being saved"));
        assert!(html.contains("Username is too long"));
        assert!(html.contains(" checked>"));
    }

    #[test]
    fn test_edit_without_errors() {
        let (vote, _) = sample();
        let html = edit(&vote, &FieldErrors::new());
        assert!(!html.contains("error_explanation"));
        assert!(html.contains(&vote.user.id.to_string()));
        assert!(html.contains(r#"<input type="hidden" name="_method" value="patch">"#));
        assert!(html.contains(r#"name="auth_token""#));
        assert!(!html.contains(vote.auth_token.as_str()));
    }

    #[test]
    fn test_error_page() {
        let html = error_page(StatusCode::UNAUTHORIZED, "HTTP Token: Access denied.");
        assert!(html.contains("<h1>401 Unauthorized</h1>"));
        assert!(html.contains("<p>HTTP Token: Access denied.</p>"));
        assert!(!error_page(StatusCode::NOT_FOUND, "<b>").contains("<b>"));
    }
}
