use actix_web::{web, HttpResponse};

use crate::app::AppState;
use crate::error::PlannerError;
use crate::middleware::auth_context::AuthenticatedUser;
use crate::models::expense::ExpenseInput;

/*
    GET /api/plans/{plan_id}/expenses
*/
pub async fn list(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, PlannerError> {
    let expenses = state.expenses.list_by_plan(&path).await?;
    Ok(HttpResponse::Ok().json(expenses))
}

/*
    POST /api/plans/{plan_id}/expenses
*/
pub async fn create(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<String>,
    input: web::Json<ExpenseInput>,
) -> Result<HttpResponse, PlannerError> {
    let expense = state.expenses.create(&path, &input).await?;
    Ok(HttpResponse::Created().json(expense))
}

/*
    GET /api/plans/{plan_id}/expenses/total
*/
pub async fn total(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, PlannerError> {
    let total = state.expenses.total_for_plan(&path).await?;
    Ok(HttpResponse::Ok().json(total))
}

/*
    PUT /api/expenses/{id}
*/
pub async fn update(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<String>,
    input: web::Json<ExpenseInput>,
) -> Result<HttpResponse, PlannerError> {
    let expense = state.expenses.update(&path, &input).await?;
    Ok(HttpResponse::Ok().json(expense))
}

/*
    DELETE /api/expenses/{id}
*/
pub async fn delete(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<HttpResponse, PlannerError> {
    state.expenses.delete(&path).await?;
    Ok(HttpResponse::NoContent().finish())
}
