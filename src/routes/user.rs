use actix_web::{web, HttpResponse};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entity::user::DEFAULT_IMAGE_URL;
use crate::entity::{post, post_tag, user};
use crate::error::AppError;
use crate::response::ResponseDto;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/list").route(web::post().to(list)))
        .service(web::resource("/save").route(web::post().to(save)))
        .service(web::resource("/update").route(web::post().to(update)))
        .service(web::resource("/remove").route(web::post().to(remove)))
        .service(web::resource("/{id:\\d+}").route(web::post().to(get)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveUserRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserRequest {
    id: Option<i32>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    id: i32,
    first_name: String,
    last_name: String,
    full_name: String,
    image_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDetailDto {
    id: i32,
    first_name: String,
    last_name: String,
    full_name: String,
    image_url: String,
    posts: Vec<UserPostDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserPostDto {
    id: i32,
    title: String,
    friendly_date: String,
}

async fn list(db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let rows = user::Entity::find()
        .order_by_asc(user::Column::LastName)
        .order_by_asc(user::Column::FirstName)
        .all(db.get_ref())
        .await?;
    let list = rows.into_iter().map(to_dto).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(list))))
}

async fn get(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let user_row = user::Entity::find_by_id(*path)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    let posts = user_row.find_related(post::Entity).all(db.get_ref()).await?;
    let dto = UserDetailDto {
        id: user_row.id,
        full_name: user_row.full_name(),
        first_name: user_row.first_name,
        last_name: user_row.last_name,
        image_url: user_row.image_url,
        posts: posts
            .into_iter()
            .map(|p| UserPostDto {
                id: p.id,
                friendly_date: p.format_date(),
                title: p.title,
            })
            .collect(),
    };
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(dto))))
}

async fn save(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<SaveUserRequest>,
) -> Result<HttpResponse, AppError> {
    let first_name = payload.first_name.clone().unwrap_or_default();
    let last_name = payload.last_name.clone().unwrap_or_default();
    if first_name.trim().is_empty() {
        return Err(AppError::validation("first name cannot be empty"));
    }
    if last_name.trim().is_empty() {
        return Err(AppError::validation("last name cannot be empty"));
    }
    let image_url = payload
        .image_url
        .clone()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string());

    let user_model = user::ActiveModel {
        first_name: Set(first_name),
        last_name: Set(last_name),
        image_url: Set(image_url),
        ..Default::default()
    };
    let inserted = user_model.insert(db.get_ref()).await?;
    debug!("user saved id={}", inserted.id);

    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(inserted.id))))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, AppError> {
    let id = payload.id.ok_or_else(|| AppError::validation("id is required"))?;
    user::Entity::find_by_id(id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    let mut active = user::ActiveModel {
        id: Set(id),
        ..Default::default()
    };
    let mut dirty = false;

    if let Some(v) = payload.first_name.clone() {
        if v.trim().is_empty() {
            return Err(AppError::validation("first name cannot be empty"));
        }
        active.first_name = Set(v);
        dirty = true;
    }
    if let Some(v) = payload.last_name.clone() {
        if v.trim().is_empty() {
            return Err(AppError::validation("last name cannot be empty"));
        }
        active.last_name = Set(v);
        dirty = true;
    }
    if let Some(v) = payload.image_url.clone() {
        // an emptied image field falls back to the placeholder
        if v.trim().is_empty() {
            active.image_url = Set(DEFAULT_IMAGE_URL.to_string());
        } else {
            active.image_url = Set(v);
        }
        dirty = true;
    }

    if dirty {
        user::Entity::update(active).exec(db.get_ref()).await?;
    }

    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    query: web::Query<RemoveQuery>,
) -> Result<HttpResponse, AppError> {
    let user_row = user::Entity::find_by_id(query.id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    let user_id = user_row.id;
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move { delete_user_cascade(txn, user_id).await })
    })
    .await
    .map_err(AppError::from)?;
    debug!("user removed id={}", user_id);

    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

fn to_dto(model: user::Model) -> UserDto {
    UserDto {
        id: model.id,
        full_name: model.full_name(),
        first_name: model.first_name,
        last_name: model.last_name,
        image_url: model.image_url,
    }
}

/// Deletes a user together with all of the user's posts and their
/// association rows, so no orphaned post survives.
async fn delete_user_cascade<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<(), AppError> {
    let post_ids: Vec<i32> = post::Entity::find()
        .filter(post::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    if !post_ids.is_empty() {
        post_tag::Entity::delete_many()
            .filter(post_tag::Column::PostId.is_in(post_ids.clone()))
            .exec(db)
            .await?;
        post::Entity::delete_many()
            .filter(post::Column::Id.is_in(post_ids))
            .exec(db)
            .await?;
    }

    user::Entity::delete_by_id(user_id).exec(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn ada() -> user::Model {
        user::Model {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            image_url: DEFAULT_IMAGE_URL.to_string(),
        }
    }

    #[tokio::test]
    async fn cascade_removes_posts_and_association_rows_before_the_user() {
        let owned_post = post::Model {
            id: 10,
            title: "Hello".to_string(),
            content: "World".to_string(),
            created_at: chrono::Utc::now(),
            user_id: 1,
        };
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results(vec![vec![owned_post]])
            .append_exec_results(vec![
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
            ])
            .into_connection();

        delete_user_cascade(&db, 1).await.unwrap();

        // select posts, delete posts_tags, delete posts, delete user
        assert_eq!(db.into_transaction_log().len(), 4);
    }

    #[tokio::test]
    async fn cascade_without_posts_only_deletes_the_user() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results(vec![Vec::<post::Model>::new()])
            .append_exec_results(vec![MockExecResult { last_insert_id: 0, rows_affected: 1 }])
            .into_connection();

        delete_user_cascade(&db, 1).await.unwrap();

        assert_eq!(db.into_transaction_log().len(), 2);
    }

    #[actix_rt::test]
    async fn list_returns_users_with_full_name() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results(vec![vec![ada()]])
            .into_connection();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .service(web::scope("/api/user").configure(config)),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/user/list").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["data"][0]["fullName"], "Ada Lovelace");
    }

    #[actix_rt::test]
    async fn save_rejects_empty_first_name() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .service(web::scope("/api/user").configure(config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/user/save")
            .set_json(serde_json::json!({"firstName": " ", "lastName": "Lovelace"}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn remove_unknown_user_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results(vec![Vec::<user::Model>::new()])
            .into_connection();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .service(web::scope("/api/user").configure(config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/user/remove?id=42")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
