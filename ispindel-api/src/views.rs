/// Page templates
///
/// Every page struct carries a [`Nav`] for the shared layout. Chart data
/// is handed to the browser as JSON in a `data-series` attribute and
/// drawn by `static/js/charts.js`.

use crate::config::Config;
use askama::Template;
use ispindel_shared::brewing::{Baseline, ChartPeriod};
use ispindel_shared::models::{
    Fermentation, FermentationWithOwner, Ispindel, IspindelWithOwner, Measurement, User,
};
use ispindel_shared::styles::BeerStyle;
use serde::Serialize;

/// Navigation bar state
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub user_name: Option<String>,
    pub picture: Option<String>,
    pub is_admin: bool,
}

impl Nav {
    pub fn new(user: Option<&User>, config: &Config) -> Self {
        match user {
            Some(user) => Self {
                user_name: Some(user.name.clone()),
                picture: user.picture.clone(),
                is_admin: config.is_admin(&user.email),
            },
            None => Self::default(),
        }
    }

    pub fn signed_in(&self) -> bool {
        self.user_name.is_some()
    }
}

/// One point of a gravity/temperature chart
#[derive(Debug, Clone, Serialize)]
pub struct ChartPoint {
    pub t: String,
    pub gravity: f64,
    pub temperature: f64,
    pub battery: f64,
    pub angle: f64,
}

/// Oldest-first JSON series for the chart script
pub fn chart_series(readings: &[Measurement]) -> String {
    let mut points: Vec<ChartPoint> = readings
        .iter()
        .map(|m| ChartPoint {
            t: m.timestamp.to_rfc3339(),
            gravity: m.gravity,
            temperature: m.temperature,
            battery: m.battery,
            angle: m.angle,
        })
        .collect();
    points.sort_by(|a, b| a.t.cmp(&b.t));

    serde_json::to_string(&points).unwrap_or_else(|_| "[]".to_string())
}

pub fn format_time(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub nav: Nav,
    pub status: u16,
    pub title: String,
    pub message: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage {
    pub nav: Nav,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginPage {
    pub nav: Nav,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub email: String,
    pub google_enabled: bool,
    pub piwo_enabled: bool,
}

#[derive(Template, Default)]
#[template(path = "auth/register.html")]
pub struct RegisterPage {
    pub nav: Nav,
    pub error: Option<String>,
    pub name: String,
    pub email: String,
}

#[derive(Template, Default)]
#[template(path = "auth/resend_activation.html")]
pub struct ResendActivationPage {
    pub nav: Nav,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub email: String,
}

#[derive(Template, Default)]
#[template(path = "auth/forgot_password.html")]
pub struct ForgotPasswordPage {
    pub nav: Nav,
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Template, Default)]
#[template(path = "auth/reset_password.html")]
pub struct ResetPasswordPage {
    pub nav: Nav,
    pub error: Option<String>,
    pub token: String,
}

/// Single-message page with an optional follow-up link
#[derive(Template)]
#[template(path = "message.html")]
pub struct MessagePage {
    pub nav: Nav,
    pub title: String,
    pub message: String,
    pub is_error: bool,
    pub link: Option<(String, String)>,
}

impl MessagePage {
    pub fn new(nav: Nav, title: &str, message: &str) -> Self {
        Self {
            nav,
            title: title.to_string(),
            message: message.to_string(),
            is_error: false,
            link: None,
        }
    }

    pub fn error(mut self) -> Self {
        self.is_error = true;
        self
    }

    pub fn with_link(mut self, href: &str, label: &str) -> Self {
        self.link = Some((href.to_string(), label.to_string()));
        self
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardPage {
    pub nav: Nav,
    pub device_count: i64,
    pub max_devices: i64,
    pub active_fermentations: i64,
    pub contact_error: Option<String>,
    pub contact_notice: Option<String>,
    pub subject: String,
    pub message: String,
}

pub struct DeviceRow {
    pub ispindel: Ispindel,
    pub silent: bool,
    pub last_seen: Option<String>,
}

#[derive(Template)]
#[template(path = "ispindels/list.html")]
pub struct IspindelListPage {
    pub nav: Nav,
    pub devices: Vec<DeviceRow>,
    pub max_devices: i64,
    pub can_add: bool,
}

#[derive(Template)]
#[template(path = "ispindels/form.html")]
pub struct IspindelFormPage {
    pub nav: Nav,
    pub title: String,
    pub action: String,
    pub error: Option<String>,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub editing: bool,
}

#[derive(Template)]
#[template(path = "ispindels/detail.html")]
pub struct IspindelDetailPage {
    pub nav: Nav,
    pub ispindel: Ispindel,
    pub readings: Vec<Measurement>,
    pub chart_json: String,
    pub endpoint_url: String,
    pub generic_endpoint_url: String,
    pub silent: bool,
}

pub struct FermentationRow {
    pub fermentation: Fermentation,
    pub duration: String,
    pub device_name: Option<String>,
    pub last_reading: Option<Measurement>,
}

#[derive(Template)]
#[template(path = "fermentations/list.html")]
pub struct FermentationListPage {
    pub nav: Nav,
    pub rows: Vec<FermentationRow>,
}

#[derive(Template)]
#[template(path = "fermentations/form.html")]
pub struct FermentationFormPage {
    pub nav: Nav,
    pub error: Option<String>,
    pub name: String,
    pub style_id: String,
    pub description: String,
    pub ispindel_id: String,
    pub devices: Vec<Ispindel>,
    pub busy_devices: Vec<Ispindel>,
    pub styles: Vec<BeerStyle>,
}

#[derive(Template)]
#[template(path = "fermentations/detail.html")]
pub struct FermentationDetailPage {
    pub nav: Nav,
    pub fermentation: Fermentation,
    pub device: Option<Ispindel>,
    pub duration: String,
    pub chart_json: String,
    pub recent: Vec<Measurement>,
    pub baseline: Option<Baseline>,
    pub current: Option<Measurement>,
    pub can_delete: bool,
    pub error: Option<String>,
}

/// Range selector entry on the chart page
pub struct PeriodLink {
    pub key: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

impl PeriodLink {
    pub fn all(selected: ChartPeriod) -> Vec<PeriodLink> {
        [
            (ChartPeriod::All, "All"),
            (ChartPeriod::Day, "24 hours"),
            (ChartPeriod::ThreeDays, "3 days"),
            (ChartPeriod::Week, "7 days"),
        ]
        .into_iter()
        .map(|(period, label)| PeriodLink {
            key: period.as_str(),
            label,
            selected: period == selected,
        })
        .collect()
    }
}

#[derive(Template)]
#[template(path = "fermentations/charts.html")]
pub struct FermentationChartsPage {
    pub nav: Nav,
    pub fermentation: Fermentation,
    pub periods: Vec<PeriodLink>,
    pub chart_json: String,
    pub count: usize,
}

#[derive(Template)]
#[template(path = "settings.html")]
pub struct SettingsPage {
    pub nav: Nav,
    pub user: User,
    pub version: &'static str,
    pub has_password: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Template)]
#[template(path = "admin/index.html")]
pub struct AdminIndexPage {
    pub nav: Nav,
    pub users: i64,
    pub active_users: i64,
    pub ispindels: i64,
    pub fermentations: i64,
}

#[derive(Template)]
#[template(path = "admin/users.html")]
pub struct AdminUsersPage {
    pub nav: Nav,
    pub users: Vec<User>,
    pub admin_email: String,
}

#[derive(Template)]
#[template(path = "admin/user_detail.html")]
pub struct AdminUserDetailPage {
    pub nav: Nav,
    pub user: User,
    pub is_admin_account: bool,
    pub ispindels: Vec<Ispindel>,
    pub fermentations: Vec<Fermentation>,
}

#[derive(Template)]
#[template(path = "admin/ispindels.html")]
pub struct AdminIspindelsPage {
    pub nav: Nav,
    pub ispindels: Vec<IspindelWithOwner>,
}

#[derive(Template)]
#[template(path = "admin/fermentations.html")]
pub struct AdminFermentationsPage {
    pub nav: Nav,
    pub fermentations: Vec<FermentationWithOwner>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn reading(minutes: i64, gravity: f64) -> Measurement {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        Measurement {
            id: minutes,
            ispindel_id: Uuid::nil(),
            device_id: "123".to_string(),
            name: "Keg".to_string(),
            angle: 50.0,
            temperature: 19.0,
            temp_units: "C".to_string(),
            battery: 4.0,
            gravity,
            reading_interval: 900,
            rssi: -60,
            timestamp: at,
            received_at: at,
        }
    }

    #[test]
    fn test_chart_series_is_chronological() {
        let json = chart_series(&[reading(30, 1.040), reading(0, 1.050)]);
        let points: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0]["gravity"], 1.050);
        assert_eq!(points[1]["gravity"], 1.040);
    }

    #[test]
    fn test_error_page_escapes_message() {
        let html = ErrorPage {
            nav: Nav::default(),
            status: 404,
            title: "Not Found".to_string(),
            message: "<script>alert(1)</script>".to_string(),
        }
        .render()
        .unwrap();

        assert!(html.contains("404"));
        assert!(!html.contains("<script>alert(1)</script>"));
    }

    #[test]
    fn test_period_links_mark_selection() {
        let links = PeriodLink::all(ChartPeriod::ThreeDays);
        let selected: Vec<&str> = links.iter().filter(|l| l.selected).map(|l| l.key).collect();

        assert_eq!(links.len(), 4);
        assert_eq!(selected, vec!["3d"]);
    }

    #[test]
    fn test_format_time() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 5, 0).unwrap();
        assert_eq!(format_time(&at), "2025-03-01 08:05");
    }
}
