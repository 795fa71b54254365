use actix_web::{web, HttpResponse};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entity::{post, post_tag, tag};
use crate::error::AppError;
use crate::relation;
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
struct SaveTagRequest {
    name: Option<String>,
    posts: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTagRequest {
    id: Option<i32>,
    name: Option<String>,
    posts: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagDto {
    id: i32,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagDetailDto {
    id: i32,
    name: String,
    posts: Vec<TagPostDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagPostDto {
    id: i32,
    title: String,
}

async fn list(db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let rows = tag::Entity::find().all(db.get_ref()).await?;
    let list = rows.into_iter().map(to_dto).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(list))))
}

async fn get(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let tag_row = tag::Entity::find_by_id(*path)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("tag"))?;

    let posts = tag_row.find_related(post::Entity).all(db.get_ref()).await?;
    let dto = TagDetailDto {
        id: tag_row.id,
        name: tag_row.name,
        posts: posts
            .into_iter()
            .map(|p| TagPostDto { id: p.id, title: p.title })
            .collect(),
    };
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(dto))))
}

async fn save(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<SaveTagRequest>,
) -> Result<HttpResponse, AppError> {
    let name = payload.name.clone().unwrap_or_default();
    if name.trim().is_empty() {
        return Err(AppError::validation("name cannot be empty"));
    }
    let tokens = payload.posts.clone().unwrap_or_default();
    let post_ids = relation::parse_id_tokens(&tokens)?;

    // a duplicate name fails on the unique index and surfaces as a conflict
    let inserted = db
        .transaction::<_, tag::Model, AppError>(|txn| {
            let name = name.clone();
            let post_ids = post_ids.clone();
            Box::pin(async move {
                let inserted = tag::ActiveModel {
                    name: Set(name),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
                let posts = relation::resolve_posts(txn, &post_ids).await?;
                relation::replace_tag_posts(txn, inserted.id, &posts).await?;
                Ok(inserted)
            })
        })
        .await
        .map_err(AppError::from)?;
    debug!("tag saved id={}", inserted.id);

    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(inserted.id))))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<UpdateTagRequest>,
) -> Result<HttpResponse, AppError> {
    let id = payload.id.ok_or_else(|| AppError::validation("id is required"))?;
    tag::Entity::find_by_id(id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("tag"))?;

    let mut active = tag::ActiveModel {
        id: Set(id),
        ..Default::default()
    };
    let mut dirty = false;
    if let Some(v) = payload.name.clone() {
        if v.trim().is_empty() {
            return Err(AppError::validation("name cannot be empty"));
        }
        active.name = Set(v);
        dirty = true;
    }

    let post_ids = match &payload.posts {
        Some(tokens) => Some(relation::parse_id_tokens(tokens)?),
        None => None,
    };

    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            if dirty {
                // a renamed tag can still collide with the unique index
                tag::Entity::update(active).exec(txn).await?;
            }
            if let Some(post_ids) = post_ids {
                let posts = relation::resolve_posts(txn, &post_ids).await?;
                relation::replace_tag_posts(txn, id, &posts).await?;
            }
            Ok(())
        })
    })
    .await
    .map_err(AppError::from)?;

    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    query: web::Query<RemoveQuery>,
) -> Result<HttpResponse, AppError> {
    let tag_row = tag::Entity::find_by_id(query.id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("tag"))?;

    let tag_id = tag_row.id;
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            post_tag::Entity::delete_many()
                .filter(post_tag::Column::TagId.eq(tag_id))
                .exec(txn)
                .await?;
            tag::Entity::delete_by_id(tag_id).exec(txn).await?;
            Ok(())
        })
    })
    .await
    .map_err(AppError::from)?;
    debug!("tag removed id={}", tag_id);

    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

fn to_dto(model: tag::Model) -> TagDto {
    TagDto {
        id: model.id,
        name: model.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, RuntimeErr};

    #[actix_rt::test]
    async fn duplicate_tag_name_returns_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_errors(vec![DbErr::Query(RuntimeErr::Internal(
                "UNIQUE constraint failed: tags.name".to_string(),
            ))])
            .into_connection();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .service(web::scope("/api/tag").configure(config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/tag/save")
            .set_json(serde_json::json!({"name": "tech"}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[actix_rt::test]
    async fn save_rejects_empty_name() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .service(web::scope("/api/tag").configure(config)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/tag/save")
            .set_json(serde_json::json!({"name": ""}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn tag_detail_lists_related_posts() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results(vec![vec![tag::Model {
                id: 3,
                name: "tech".to_string(),
            }]])
            .append_query_results(vec![vec![post::Model {
                id: 10,
                title: "Hello".to_string(),
                content: "World".to_string(),
                created_at: chrono::Utc::now(),
                user_id: 1,
            }]])
            .into_connection();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(db))
                .service(web::scope("/api/tag").configure(config)),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/tag/3").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["data"]["name"], "tech");
        assert_eq!(body["data"]["posts"][0]["title"], "Hello");
    }
}
