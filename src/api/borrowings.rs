//! Borrow and return endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::borrowing::{BorrowRequest, BorrowingResult},
    AppState,
};

/// Borrow a book
#[utoipa::path(
    post,
    path = "/borrowings/borrow",
    tag = "borrowings",
    request_body = BorrowRequest,
    responses(
        (status = 200, description = "Book borrowed", body = BorrowingResult),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Book or patron not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Book already borrowed", body = crate::error::ErrorResponse),
        (status = 503, description = "Temporary storage failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    Json(request): Json<BorrowRequest>,
) -> AppResult<Json<BorrowingResult>> {
    request.validate()?;

    let result = state
        .services
        .lending
        .borrow(request.book_id, request.patron_id)
        .await?;
    Ok(Json(result))
}

/// Return a borrowed book
#[utoipa::path(
    put,
    path = "/borrowings/return/{book_id}/patron/{patron_id}",
    tag = "borrowings",
    params(
        ("book_id" = i64, Path, description = "Book ID"),
        ("patron_id" = i64, Path, description = "Patron ID of the borrower")
    ),
    responses(
        (status = 200, description = "Book returned", body = BorrowingResult),
        (status = 404, description = "No open borrowing for this book and patron", body = crate::error::ErrorResponse),
        (status = 503, description = "Temporary storage failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    Path((book_id, patron_id)): Path<(i64, i64)>,
) -> AppResult<Json<BorrowingResult>> {
    let result = state.services.lending.return_book(book_id, patron_id).await?;
    Ok(Json(result))
}
