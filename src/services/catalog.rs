use chrono::{Duration, NaiveDateTime, SubsecRound};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Blockout, Channel, Company, ReminderConfig, Resource, ResourceKind, Service, TimeUnit,
    WeeklyAvailability,
};

/// A service has to fit inside one working-hours rule, so never more than a day.
pub const MAX_SERVICE_MINUTES: i64 = 24 * 60;

/// Furthest ahead of an appointment a reminder may be scheduled.
pub const MAX_REMINDER_OFFSET_DAYS: i64 = 365;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn company_exists(conn: &Connection, company_id: &str) -> Result<(), AppError> {
    queries::get_company(conn, company_id)?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("company {company_id}")))
}

fn resource(conn: &Connection, resource_id: &str) -> Result<Resource, AppError> {
    queries::get_resource(conn, resource_id)?
        .ok_or_else(|| AppError::NotFound(format!("resource {resource_id}")))
}

#[derive(Debug, Deserialize)]
pub struct NewCompany {
    pub name: String,
}

pub fn create_company(conn: &Connection, input: &NewCompany) -> Result<Company, AppError> {
    required("name", &input.name)?;
    let company = Company {
        id: new_id(),
        name: input.name.trim().to_string(),
    };
    queries::insert_company(conn, &company)?;
    Ok(company)
}

#[derive(Debug, Deserialize)]
pub struct NewResource {
    pub company_id: String,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ResourceKind,
}

fn default_kind() -> ResourceKind {
    ResourceKind::Staff
}

pub fn create_resource(conn: &Connection, input: &NewResource) -> Result<Resource, AppError> {
    required("name", &input.name)?;
    company_exists(conn, &input.company_id)?;

    let resource = Resource {
        id: new_id(),
        company_id: input.company_id.clone(),
        name: input.name.trim().to_string(),
        kind: input.kind,
    };
    queries::insert_resource(conn, &resource)?;
    Ok(resource)
}

#[derive(Debug, Deserialize)]
pub struct NewService {
    pub company_id: String,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub resource_ids: Vec<String>,
}

/// Creates a service and attaches its eligible resources in the given order,
/// which is also the order slots are listed in.
pub fn create_service(conn: &Connection, input: &NewService) -> Result<Service, AppError> {
    required("name", &input.name)?;
    if !(1..=MAX_SERVICE_MINUTES).contains(&input.duration_minutes) {
        return Err(AppError::Validation(format!(
            "duration_minutes must be between 1 and {MAX_SERVICE_MINUTES}"
        )));
    }
    company_exists(conn, &input.company_id)?;
    for resource_id in &input.resource_ids {
        if resource(conn, resource_id)?.company_id != input.company_id {
            return Err(AppError::Validation(format!(
                "resource {resource_id} belongs to another company"
            )));
        }
    }

    let service = Service {
        id: new_id(),
        company_id: input.company_id.clone(),
        name: input.name.trim().to_string(),
        duration_minutes: input.duration_minutes,
    };
    queries::insert_service(conn, &service, &input.resource_ids)?;
    Ok(service)
}

#[derive(Debug, Deserialize)]
pub struct NewAvailability {
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

pub fn add_availability(
    conn: &Connection,
    resource_id: &str,
    input: &NewAvailability,
) -> Result<WeeklyAvailability, AppError> {
    resource(conn, resource_id)?;

    let parse = |s: &str| {
        crate::models::availability::parse_time(s).map_err(|e| AppError::Validation(e.to_string()))
    };
    let rule = WeeklyAvailability {
        id: new_id(),
        resource_id: resource_id.to_string(),
        day_of_week: input.day_of_week,
        start_time: parse(&input.start_time)?,
        end_time: parse(&input.end_time)?,
        is_available: input.is_available,
    };
    rule.validate().map_err(AppError::Validation)?;
    queries::insert_availability(conn, &rule)?;
    Ok(rule)
}

#[derive(Debug, Deserialize)]
pub struct NewBlockout {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub reason: Option<String>,
}

pub fn add_blockout(
    conn: &Connection,
    resource_id: &str,
    input: &NewBlockout,
) -> Result<Blockout, AppError> {
    resource(conn, resource_id)?;
    let start_time = input.start_time.trunc_subsecs(0);
    let end_time = input.end_time.trunc_subsecs(0);
    if start_time >= end_time {
        return Err(AppError::Validation(
            "blockout start must be before its end".to_string(),
        ));
    }

    let blockout = Blockout {
        id: new_id(),
        resource_id: resource_id.to_string(),
        start_time,
        end_time,
        reason: input.reason.clone(),
    };
    queries::insert_blockout(conn, &blockout)?;
    Ok(blockout)
}

#[derive(Debug, Deserialize)]
pub struct NewReminderConfig {
    pub company_id: String,
    pub time_value: i64,
    pub time_unit: TimeUnit,
    pub channel: Channel,
}

pub fn create_reminder_config(
    conn: &Connection,
    input: &NewReminderConfig,
) -> Result<ReminderConfig, AppError> {
    let in_range = input.time_value > 0
        && input
            .time_unit
            .to_duration(input.time_value)
            .is_some_and(|offset| offset <= Duration::days(MAX_REMINDER_OFFSET_DAYS));
    if !in_range {
        return Err(AppError::Validation(format!(
            "reminder offset must be positive and at most {MAX_REMINDER_OFFSET_DAYS} days"
        )));
    }
    company_exists(conn, &input.company_id)?;

    let config = ReminderConfig {
        id: new_id(),
        company_id: input.company_id.clone(),
        time_value: input.time_value,
        time_unit: input.time_unit,
        channel: input.channel,
        is_active: true,
    };
    queries::insert_reminder_config(conn, &config)?;
    Ok(config)
}
