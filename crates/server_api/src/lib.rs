use chrono::Utc;
use shared::{
    domain::{CompanyId, DealId, DealStatus, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CompanySummary, Deal, DealFilters, DealUpdate, NewCompany, NewDeal, NewUser, UserSummary,
    },
};
use storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_deals(ctx: &ApiContext, filters: &DealFilters) -> Result<Vec<Deal>, ApiError> {
    ctx.storage.list_deals(filters).await.map_err(internal)
}

pub async fn get_deal(ctx: &ApiContext, deal_id: DealId) -> Result<Deal, ApiError> {
    ctx.storage
        .load_deal(deal_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| deal_not_found(deal_id))
}

pub async fn create_deal(ctx: &ApiContext, deal: NewDeal) -> Result<Deal, ApiError> {
    let deal = NewDeal {
        title: validate_title(&deal.title)?,
        ..deal
    };
    validate_value(deal.value)?;
    ensure_user_exists(ctx, deal.user_id).await?;
    ensure_company_exists(ctx, deal.company_id).await?;

    let deal_id = ctx.storage.create_deal(&deal).await.map_err(internal)?;
    info!(deal_id = deal_id.0, status = %deal.status, "deal created");
    get_deal(ctx, deal_id).await
}

/// Applies a partial update. Entering a closed status stamps `closed_at`;
/// returning to `in_progress` clears it.
pub async fn update_deal(
    ctx: &ApiContext,
    deal_id: DealId,
    update: DealUpdate,
) -> Result<Deal, ApiError> {
    let mut deal = get_deal(ctx, deal_id).await?;
    if update.is_empty() {
        return Ok(deal);
    }

    if let Some(title) = update.title.as_deref() {
        deal.title = validate_title(title)?;
    }
    if let Some(value) = update.value {
        validate_value(value)?;
        deal.value = value;
    }
    if let Some(deal_type) = update.deal_type {
        deal.deal_type = deal_type;
    }
    if let Some(user_id) = update.user_id {
        ensure_user_exists(ctx, user_id).await?;
        deal.user_id = user_id;
    }
    if let Some(company_id) = update.company_id {
        ensure_company_exists(ctx, company_id).await?;
        deal.company_id = company_id;
    }
    if update.lead_source.is_some() {
        deal.lead_source = update.lead_source;
    }
    if update.product_name.is_some() {
        deal.product_name = update.product_name;
    }

    let now = Utc::now();
    if let Some(status) = update.status {
        if status != deal.status {
            info!(
                deal_id = deal_id.0,
                from = %deal.status,
                to = %status,
                "deal status changed"
            );
            deal.closed_at = match status {
                DealStatus::InProgress => None,
                _ if deal.status.is_closed() => deal.closed_at.or(Some(now)),
                _ => Some(now),
            };
            deal.status = status;
        }
    }
    deal.updated_at = now;

    if !ctx.storage.save_deal(&deal).await.map_err(internal)? {
        return Err(deal_not_found(deal_id));
    }
    get_deal(ctx, deal_id).await
}

pub async fn delete_deal(ctx: &ApiContext, deal_id: DealId) -> Result<(), ApiError> {
    if !ctx.storage.delete_deal(deal_id).await.map_err(internal)? {
        return Err(deal_not_found(deal_id));
    }
    info!(deal_id = deal_id.0, "deal deleted");
    Ok(())
}

pub async fn list_companies(ctx: &ApiContext) -> Result<Vec<CompanySummary>, ApiError> {
    ctx.storage.list_companies().await.map_err(internal)
}

pub async fn create_company(
    ctx: &ApiContext,
    company: NewCompany,
) -> Result<CompanySummary, ApiError> {
    let company_name = company.company_name.trim();
    if company_name.is_empty() {
        return Err(ApiError::validation("company_name must not be empty"));
    }
    let company_id = ctx
        .storage
        .create_company(company_name, company.industry.trim())
        .await
        .map_err(internal)?;
    ctx.storage
        .load_company(company_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "company vanished after insert"))
}

pub async fn list_users(ctx: &ApiContext) -> Result<Vec<UserSummary>, ApiError> {
    ctx.storage.list_users().await.map_err(internal)
}

pub async fn create_user(ctx: &ApiContext, user: NewUser) -> Result<UserSummary, ApiError> {
    let name = user.name.trim();
    let email = user.email.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("email is invalid"));
    }
    if ctx
        .storage
        .find_user_by_email(email)
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err(ApiError::validation(format!(
            "a user with email {email} already exists"
        )));
    }
    let user_id = ctx
        .storage
        .create_user(name, email)
        .await
        .map_err(internal)?;
    ctx.storage
        .load_user(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "user vanished after insert"))
}

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("title must not be empty"));
    }
    Ok(title.to_string())
}

fn validate_value(value: f64) -> Result<(), ApiError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::validation("value must be a non-negative number"));
    }
    Ok(())
}

async fn ensure_user_exists(ctx: &ApiContext, user_id: UserId) -> Result<(), ApiError> {
    ctx.storage
        .load_user(user_id)
        .await
        .map_err(internal)?
        .map(|_| ())
        .ok_or_else(|| ApiError::validation(format!("user {user_id} does not exist")))
}

async fn ensure_company_exists(ctx: &ApiContext, company_id: CompanyId) -> Result<(), ApiError> {
    ctx.storage
        .load_company(company_id)
        .await
        .map_err(internal)?
        .map(|_| ())
        .ok_or_else(|| ApiError::validation(format!("company {company_id} does not exist")))
}

fn deal_not_found(deal_id: DealId) -> ApiError {
    ApiError::not_found(format!("deal {deal_id} not found"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::DealType;

    async fn setup() -> (ApiContext, UserId, CompanyId) {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let user = storage
            .create_user("alice", "alice@example.com")
            .await
            .expect("user");
        let company = storage
            .create_company("Acme", "retail")
            .await
            .expect("company");
        (ApiContext { storage }, user, company)
    }

    fn new_deal(user: UserId, company: CompanyId) -> NewDeal {
        NewDeal {
            title: "  Annual license  ".into(),
            value: 5_000.0,
            status: DealStatus::InProgress,
            deal_type: DealType::Direct,
            user_id: user,
            company_id: company,
            lead_source: None,
            product_name: None,
        }
    }

    #[tokio::test]
    async fn create_deal_trims_title_and_embeds_relations() {
        let (ctx, user, company) = setup().await;
        let deal = create_deal(&ctx, new_deal(user, company))
            .await
            .expect("deal");
        assert_eq!(deal.title, "Annual license");
        assert_eq!(deal.company.map(|c| c.id), Some(company));
        assert_eq!(deal.user.map(|u| u.id), Some(user));
    }

    #[tokio::test]
    async fn create_deal_rejects_unknown_company() {
        let (ctx, user, _) = setup().await;
        let err = create_deal(&ctx, new_deal(user, CompanyId(404)))
            .await
            .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
    }

    #[tokio::test]
    async fn create_deal_rejects_negative_value() {
        let (ctx, user, company) = setup().await;
        let mut deal = new_deal(user, company);
        deal.value = -1.0;
        let err = create_deal(&ctx, deal).await.expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
    }

    #[tokio::test]
    async fn status_update_stamps_and_clears_closed_at() {
        let (ctx, user, company) = setup().await;
        let deal = create_deal(&ctx, new_deal(user, company))
            .await
            .expect("deal");

        let won = update_deal(&ctx, deal.id, DealUpdate::status(DealStatus::Won))
            .await
            .expect("won");
        assert_eq!(won.status, DealStatus::Won);
        let closed_at = won.closed_at.expect("closed_at stamped");

        let lost = update_deal(&ctx, deal.id, DealUpdate::status(DealStatus::Lost))
            .await
            .expect("lost");
        assert_eq!(lost.closed_at, Some(closed_at));

        let reopened = update_deal(&ctx, deal.id, DealUpdate::status(DealStatus::InProgress))
            .await
            .expect("reopened");
        assert_eq!(reopened.status, DealStatus::InProgress);
        assert_eq!(reopened.closed_at, None);
    }

    #[tokio::test]
    async fn update_unknown_deal_is_not_found() {
        let (ctx, _, _) = setup().await;
        let err = update_deal(&ctx, DealId(77), DealUpdate::status(DealStatus::Won))
            .await
            .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let (ctx, user, company) = setup().await;
        let deal = create_deal(&ctx, new_deal(user, company))
            .await
            .expect("deal");
        delete_deal(&ctx, deal.id).await.expect("delete");
        let err = get_deal(&ctx, deal.id).await.expect_err("gone");
        assert!(matches!(err.code, ErrorCode::NotFound));
        let err = delete_deal(&ctx, deal.id).await.expect_err("gone");
        assert!(matches!(err.code, ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn create_user_validates_email() {
        let (ctx, _, _) = setup().await;
        let err = create_user(
            &ctx,
            NewUser {
                name: "dave".into(),
                email: "not-an-email".into(),
            },
        )
        .await
        .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
    }

    #[tokio::test]
    async fn create_user_refuses_a_registered_email() {
        let (ctx, alice, _) = setup().await;
        let err = create_user(
            &ctx,
            NewUser {
                name: "mallory".into(),
                email: " alice@example.com ".into(),
            },
        )
        .await
        .expect_err("duplicate email");
        assert!(matches!(err.code, ErrorCode::Validation));

        let user = ctx
            .storage
            .load_user(alice)
            .await
            .expect("load")
            .expect("some");
        assert_eq!(user.name, "alice");
    }
}
