use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use auth_cell::AuthService;
use schedule_cell::{compare_time, is_valid_time_format, DaySchedule, ScheduleService, WeeklySchedule};
use shared_models::auth::User;

fn describe_user(user: &User) -> String {
    let name = user.name.as_deref().unwrap_or("(no name)");
    let email = user.email.as_deref().unwrap_or("-");
    let role = user.role.as_deref().unwrap_or("-");
    format!("{} <{}> [{}] id={}", name, email, role, user.id)
}

pub async fn login(auth: &AuthService, email: &str, password: &str) -> Result<()> {
    match auth.login(email, password).await? {
        Some(user) => println!("Logged in as {}", describe_user(&user)),
        None => println!("Logged in as {}", email.trim()),
    }
    Ok(())
}

pub async fn whoami(auth: &AuthService, verify: bool) -> Result<()> {
    if verify {
        let user = auth.verify().await?;
        println!("{}", describe_user(&user));
        return Ok(());
    }

    let status = auth.session_status();
    if !status.authenticated {
        println!("Not logged in.");
        return Ok(());
    }

    match auth.current_user() {
        Some(user) => println!("{}", describe_user(&user)),
        None => println!("user id={}", status.user_id.as_deref().unwrap_or("unknown")),
    }
    if let Some(expires_at) = status.expires_at {
        let state = if status.expired { "expired" } else { "expires" };
        println!("Access token {} at {}", state, expires_at.to_rfc3339());
    }
    Ok(())
}

pub fn render_day(day: &DaySchedule) -> String {
    let name = day.day_of_week.name();
    if !day.is_available {
        return format!("{:<10} unavailable", name);
    }

    let mut line = format!("{:<10} {}-{}", name, day.start_time, day.end_time);
    if let (Some(start), Some(end)) = (day.break_start, day.break_end) {
        line.push_str(&format!("  break {}-{}", start, end));
    }
    line
}

pub fn render_week(week: &WeeklySchedule) -> String {
    week.iter().map(render_day).collect::<Vec<_>>().join("\n")
}

pub async fn show_week(schedules: &ScheduleService, doctor_id: &str, json: bool) -> Result<()> {
    let week = schedules.load_weekly(Some(doctor_id)).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&week)?);
    } else {
        println!("{}", render_week(&week));
    }
    Ok(())
}

pub fn check_time(time: &str, against: Option<&str>) -> Result<()> {
    if !is_valid_time_format(time) {
        bail!("'{}' is not a valid HH:MM time", time);
    }

    let Some(other) = against else {
        println!("{} is valid", time);
        return Ok(());
    };

    match compare_time(time, other) {
        Some(Ordering::Less) => println!("{} is before {}", time, other),
        Some(Ordering::Equal) => println!("{} is the same as {}", time, other),
        Some(Ordering::Greater) => println!("{} is after {}", time, other),
        None => bail!("'{}' is not a valid HH:MM time", other),
    }
    Ok(())
}

pub fn read_week_file(path: &Path) -> Result<WeeklySchedule> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing weekly schedule in {}", path.display()))
}

pub async fn submit_week(schedules: &ScheduleService, doctor_id: &str, path: &Path) -> Result<()> {
    let week = read_week_file(path)?;
    let available = week.available_days().count();

    let saved = schedules.submit_weekly(doctor_id, &week).await?;
    println!(
        "Submitted {} available days for doctor {} ({} stored)",
        available,
        doctor_id,
        saved.len()
    );
    Ok(())
}
