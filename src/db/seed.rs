use std::fs;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use super::queries;
use crate::models::business::{
    parse_timezone, DEFAULT_CANCELLATION_WINDOW_HOURS, DEFAULT_MAX_ADVANCE_DAYS,
    DEFAULT_MIN_NOTICE_HOURS, DEFAULT_SLOT_GRANULARITY_MINUTES, DEFAULT_TIMEZONE,
};
use crate::models::hours::parse_time;
use crate::models::{
    Business, DateOverride, DepositPolicy, OpenInterval, Service, Stylist, TimeOff, WeeklyHours,
};

/// Tenant catalog loaded at startup: businesses, services and stylist schedules.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub businesses: Vec<SeedBusiness>,
    #[serde(default)]
    pub services: Vec<SeedService>,
    #[serde(default)]
    pub stylists: Vec<SeedStylist>,
}

#[derive(Debug, Deserialize)]
pub struct SeedBusiness {
    pub id: String,
    pub name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_min_notice")]
    pub min_notice_hours: i64,
    #[serde(default = "default_max_advance")]
    pub max_advance_days: i64,
    #[serde(default = "default_cancellation_window")]
    pub cancellation_window_hours: i64,
    #[serde(default = "default_granularity")]
    pub slot_granularity_minutes: i64,
    #[serde(default)]
    pub business_hours: WeeklyHours,
}

#[derive(Debug, Deserialize)]
pub struct SeedService {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub buffer_before_minutes: i64,
    #[serde(default)]
    pub buffer_after_minutes: i64,
    #[serde(default)]
    pub deposit_required: bool,
    #[serde(default)]
    pub deposit_amount_cents: i64,
    #[serde(default)]
    pub base_price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct SeedStylist {
    pub id: String,
    pub business_id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub weekly_hours: WeeklyHours,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<SeedOverride>,
    #[serde(default)]
    pub time_off: Vec<SeedTimeOff>,
}

#[derive(Debug, Deserialize)]
pub struct SeedOverride {
    pub date: NaiveDate,
    pub open: Option<String>,
    pub close: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedTimeOff {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_min_notice() -> i64 {
    DEFAULT_MIN_NOTICE_HOURS
}

fn default_max_advance() -> i64 {
    DEFAULT_MAX_ADVANCE_DAYS
}

fn default_cancellation_window() -> i64 {
    DEFAULT_CANCELLATION_WINDOW_HOURS
}

fn default_granularity() -> i64 {
    DEFAULT_SLOT_GRANULARITY_MINUTES
}

fn default_true() -> bool {
    true
}

pub fn load_seed_file(conn: &mut Connection, path: &str) -> anyhow::Result<()> {
    let json = fs::read_to_string(path).with_context(|| format!("failed to read seed file: {path}"))?;
    load_seed_str(conn, &json)
}

pub fn load_seed_str(conn: &mut Connection, json: &str) -> anyhow::Result<()> {
    let seed: SeedData = serde_json::from_str(json).context("failed to parse seed data")?;
    apply_seed(conn, &seed)
}

/// Upserts the whole seed in one transaction.
pub fn apply_seed(conn: &mut Connection, seed: &SeedData) -> anyhow::Result<()> {
    let tx = conn.transaction().context("failed to start seed transaction")?;

    for b in &seed.businesses {
        b.business_hours
            .validate()
            .with_context(|| format!("invalid business hours for {}", b.id))?;
        let timezone = parse_timezone(&b.timezone)
            .with_context(|| format!("unknown time zone {} for business {}", b.timezone, b.id))?;
        let business = Business {
            id: b.id.clone(),
            name: b.name.clone(),
            timezone,
            min_notice_hours: b.min_notice_hours,
            max_advance_days: b.max_advance_days,
            cancellation_window_hours: b.cancellation_window_hours,
            slot_granularity_minutes: b.slot_granularity_minutes,
            business_hours: b.business_hours.clone(),
        };
        queries::save_business(&tx, &business)?;
    }

    for s in &seed.services {
        anyhow::ensure!(s.duration_minutes > 0, "service {} must have a positive duration", s.id);
        let service = Service {
            id: s.id.clone(),
            business_id: s.business_id.clone(),
            name: s.name.clone(),
            duration_minutes: s.duration_minutes,
            buffer_before_minutes: s.buffer_before_minutes,
            buffer_after_minutes: s.buffer_after_minutes,
            deposit: DepositPolicy {
                required: s.deposit_required,
                amount_cents: s.deposit_amount_cents,
            },
            base_price_cents: s.base_price_cents,
        };
        queries::save_service(&tx, &service)?;
    }

    for s in &seed.stylists {
        s.weekly_hours
            .validate()
            .with_context(|| format!("invalid weekly hours for stylist {}", s.id))?;
        let stylist = Stylist {
            id: s.id.clone(),
            business_id: s.business_id.clone(),
            name: s.name.clone(),
            is_active: s.active,
            weekly_hours: s.weekly_hours.clone(),
        };
        queries::save_stylist(&tx, &stylist)?;

        for service_id in &s.services {
            queries::link_stylist_service(&tx, &s.id, service_id)?;
        }

        for o in &s.overrides {
            let hours = match (&o.open, &o.close) {
                (Some(open), Some(close)) => {
                    let interval = OpenInterval::new(parse_time(open)?, parse_time(close)?);
                    anyhow::ensure!(
                        interval.is_some(),
                        "override on {} for stylist {} closes before it opens",
                        o.date,
                        s.id
                    );
                    interval
                }
                _ => None,
            };
            queries::save_date_override(
                &tx,
                &DateOverride {
                    stylist_id: s.id.clone(),
                    date: o.date,
                    hours,
                },
            )?;
        }

        for block in &s.time_off {
            queries::insert_time_off(
                &tx,
                &TimeOff {
                    stylist_id: s.id.clone(),
                    starts_at: block.starts_at,
                    ends_at: block.ends_at,
                    reason: block.reason.clone(),
                },
            )?;
        }
    }

    tx.commit().context("failed to commit seed data")?;
    tracing::info!(
        businesses = seed.businesses.len(),
        services = seed.services.len(),
        stylists = seed.stylists.len(),
        "seed data loaded"
    );
    Ok(())
}
