use actix_web::{web, HttpResponse};
use chrono::{SecondsFormat, Utc};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::entity::{post, post_tag, tag, user};
use crate::error::AppError;
use crate::relation;
use crate::response::ResponseDto;

const RECENT_POST_COUNT: u64 = 5;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/recent").route(web::post().to(recent)))
        .service(web::resource("/list").route(web::post().to(list)))
        .service(web::resource("/save").route(web::post().to(save)))
        .service(web::resource("/update").route(web::post().to(update)))
        .service(web::resource("/remove").route(web::post().to(remove)))
        .service(web::resource("/{id:\\d+}").route(web::post().to(get)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavePostRequest {
    title: Option<String>,
    content: Option<String>,
    user_id: Option<i32>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePostRequest {
    id: Option<i32>,
    title: Option<String>,
    content: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RemoveQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostDto {
    id: i32,
    title: String,
    content: String,
    user_id: i32,
    author_name: String,
    created: String,
    friendly_date: String,
    tags: Vec<PostTagDto>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostTagDto {
    id: i32,
    name: String,
}

async fn recent(db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let rows = post::Entity::find()
        .order_by_desc(post::Column::CreatedAt)
        .limit(RECENT_POST_COUNT)
        .all(db.get_ref())
        .await?;
    let mut list = Vec::with_capacity(rows.len());
    for row in rows {
        list.push(build_post_dto(db.get_ref(), row).await?);
    }
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(list))))
}

async fn list(db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let rows = post::Entity::find().all(db.get_ref()).await?;
    let mut list = Vec::with_capacity(rows.len());
    for row in rows {
        list.push(build_post_dto(db.get_ref(), row).await?);
    }
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(list))))
}

async fn get(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let post_row = post::Entity::find_by_id(*path)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("post"))?;

    let dto = build_post_dto(db.get_ref(), post_row).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(dto))))
}

async fn save(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<SavePostRequest>,
) -> Result<HttpResponse, AppError> {
    let title = payload.title.clone().unwrap_or_default();
    let content = payload.content.clone().unwrap_or_default();
    if title.trim().is_empty() {
        return Err(AppError::validation("title cannot be empty"));
    }
    if content.trim().is_empty() {
        return Err(AppError::validation("content cannot be empty"));
    }
    let user_id = payload
        .user_id
        .ok_or_else(|| AppError::validation("userId is required"))?;
    let tokens = payload.tags.clone().unwrap_or_default();
    let tag_ids = relation::parse_id_tokens(&tokens)?;

    let owner = user::Entity::find_by_id(user_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;

    let post_model = post::ActiveModel {
        title: Set(title),
        content: Set(content),
        created_at: Set(Utc::now()),
        user_id: Set(owner.id),
        ..Default::default()
    };

    let inserted = db
        .transaction::<_, post::Model, AppError>(|txn| {
            let tag_ids = tag_ids.clone();
            Box::pin(async move {
                let inserted = post_model.insert(txn).await?;
                let tags = relation::resolve_tags(txn, &tag_ids).await?;
                relation::replace_post_tags(txn, inserted.id, &tags).await?;
                Ok(inserted)
            })
        })
        .await
        .map_err(AppError::from)?;
    debug!("post saved id={}", inserted.id);

    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(inserted.id))))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, AppError> {
    let id = payload.id.ok_or_else(|| AppError::validation("id is required"))?;
    post::Entity::find_by_id(id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("post"))?;

    let mut active = post::ActiveModel {
        id: Set(id),
        ..Default::default()
    };
    let mut dirty = false;
    if let Some(v) = payload.title.clone() {
        if v.trim().is_empty() {
            return Err(AppError::validation("title cannot be empty"));
        }
        active.title = Set(v);
        dirty = true;
    }
    if let Some(v) = payload.content.clone() {
        if v.trim().is_empty() {
            return Err(AppError::validation("content cannot be empty"));
        }
        active.content = Set(v);
        dirty = true;
    }

    // an omitted tag list leaves the association set untouched,
    // an empty list clears it
    let tag_ids = match &payload.tags {
        Some(tokens) => Some(relation::parse_id_tokens(tokens)?),
        None => None,
    };

    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            if dirty {
                post::Entity::update(active).exec(txn).await?;
            }
            if let Some(tag_ids) = tag_ids {
                let tags = relation::resolve_tags(txn, &tag_ids).await?;
                relation::replace_post_tags(txn, id, &tags).await?;
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
    let post_row = post::Entity::find_by_id(query.id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("post"))?;

    let post_id = post_row.id;
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            post_tag::Entity::delete_many()
                .filter(post_tag::Column::PostId.eq(post_id))
                .exec(txn)
                .await?;
            post::Entity::delete_by_id(post_id).exec(txn).await?;
            Ok(())
        })
    })
    .await
    .map_err(AppError::from)?;
    debug!("post removed id={}", post_id);

    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn build_post_dto<C: ConnectionTrait>(
    db: &C,
    model: post::Model,
) -> Result<PostDto, AppError> {
    let owner = model
        .find_related(user::Entity)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    let tags = model.find_related(tag::Entity).all(db).await?;

    Ok(PostDto {
        id: model.id,
        user_id: model.user_id,
        author_name: owner.full_name(),
        created: model.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        friendly_date: model.format_date(),
        title: model.title,
        content: model.content,
        tags: tags
            .into_iter()
            .map(|t| PostTagDto { id: t.id, name: t.name })
            .collect(),
    })
}
