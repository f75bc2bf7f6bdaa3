use axum::{Extension, Json, extract::State};
use chrono::{Datelike, TimeZone, Utc};
use std::sync::Arc;

use super::auth::AuthUser;
use super::invoices::resolve_invoice_dtos;
use super::{ApiError, ApiResponse, AppState, DashboardStatsDto, MonthlyCountDto, StatusCountDto};
use crate::models::InvoiceStatus;

const RECENT_LIMIT: u64 = 10;
const MONTHLY_WINDOW: u32 = 6;

/// GET /dashboard/stats
/// Supervisors and admins see site-wide numbers; everyone else sees only
/// their own invoices.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ApiResponse<DashboardStatsDto>>, ApiError> {
    let only_user = (!auth.role.sees_all_invoices()).then_some(auth.id);
    let store = state.store();

    let total_invoices = store
        .count_invoices(None, only_user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count invoices: {e}")))?;
    let pending_invoices = store
        .count_invoices(Some(InvoiceStatus::Pending), only_user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count invoices: {e}")))?;
    let approved_invoices = store
        .count_invoices(Some(InvoiceStatus::Approved), only_user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count invoices: {e}")))?;
    let rejected_invoices = store
        .count_invoices(Some(InvoiceStatus::Rejected), only_user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to count invoices: {e}")))?;

    let recent = store
        .recent_invoices(RECENT_LIMIT, only_user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load recent invoices: {e}")))?;
    let recent_invoices = resolve_invoice_dtos(&state, recent, false).await?;

    let status_distribution = store
        .invoice_status_distribution(only_user)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load status distribution: {e}")))?
        .into_iter()
        .map(|(status, count)| StatusCountDto { status, count })
        .collect();

    let monthly_stats = monthly_stats(&state, only_user).await?;

    Ok(Json(ApiResponse::success(DashboardStatsDto {
        total_invoices,
        pending_invoices,
        approved_invoices,
        rejected_invoices,
        recent_invoices,
        status_distribution,
        monthly_stats,
    })))
}

/// Invoice counts for the last six calendar months, oldest first.
async fn monthly_stats(
    state: &AppState,
    only_user: Option<i32>,
) -> Result<Vec<MonthlyCountDto>, ApiError> {
    let now = Utc::now();
    let mut out = Vec::with_capacity(MONTHLY_WINDOW as usize);

    for offset in (0..MONTHLY_WINDOW).rev() {
        let (year, month) = shift_month(now.year(), now.month(), offset);
        let (next_year, next_month) = advance_month(year, month);

        let start = Utc
            .with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| ApiError::internal("Invalid month boundary"))?;
        let end = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| ApiError::internal("Invalid month boundary"))?;

        let count = state
            .store()
            .count_invoices_created_between(&start.to_rfc3339(), &end.to_rfc3339(), only_user)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to count monthly invoices: {e}")))?;

        out.push(MonthlyCountDto {
            month: format!("{} {}", month_name(month), year),
            count,
        });
    }

    Ok(out)
}

fn shift_month(year: i32, month: u32, back: u32) -> (i32, u32) {
    let total = year * 12 + (month as i32 - 1) - back as i32;
    (total.div_euclid(12), (total.rem_euclid(12) + 1) as u32)
}

fn advance_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}
