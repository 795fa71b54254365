//! Resolves submitted id tokens into entity rows and keeps the
//! posts_tags association in sync from either editing direction.

use std::collections::HashSet;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::entity::{post, post_tag, tag};
use crate::error::AppError;

/// Parses raw form tokens into ids. Any non-numeric token fails the
/// whole call; ids pointing at deleted rows are handled by the
/// resolve functions instead.
pub fn parse_id_tokens(tokens: &[String]) -> Result<Vec<i32>, AppError> {
    tokens
        .iter()
        .map(|token| {
            token
                .trim()
                .parse::<i32>()
                .map_err(|_| AppError::validation(format!("'{}' is not a valid id", token)))
        })
        .collect()
}

/// Loads the tags whose id is in `ids`, in storage order. Unknown ids
/// are silently dropped.
pub async fn resolve_tags<C: ConnectionTrait>(
    db: &C,
    ids: &[i32],
) -> Result<Vec<tag::Model>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = tag::Entity::find()
        .filter(tag::Column::Id.is_in(ids.iter().copied()))
        .all(db)
        .await?;
    Ok(rows)
}

/// Loads the posts whose id is in `ids`, in storage order. Unknown ids
/// are silently dropped.
pub async fn resolve_posts<C: ConnectionTrait>(
    db: &C,
    ids: &[i32],
) -> Result<Vec<post::Model>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = post::Entity::find()
        .filter(post::Column::Id.is_in(ids.iter().copied()))
        .all(db)
        .await?;
    Ok(rows)
}

/// Replaces the tag set of a post. Diffs against the current rows so an
/// unchanged set issues no writes. Callers run this inside a transaction.
pub async fn replace_post_tags<C: ConnectionTrait>(
    db: &C,
    post_id: i32,
    tags: &[tag::Model],
) -> Result<(), AppError> {
    let current = post_tag::Entity::find()
        .filter(post_tag::Column::PostId.eq(post_id))
        .all(db)
        .await?;
    let current_ids: HashSet<i32> = current.iter().map(|row| row.tag_id).collect();
    let target_ids: HashSet<i32> = tags.iter().map(|t| t.id).collect();

    let removed: Vec<i32> = current
        .iter()
        .filter(|row| !target_ids.contains(&row.tag_id))
        .map(|row| row.tag_id)
        .collect();
    if !removed.is_empty() {
        post_tag::Entity::delete_many()
            .filter(post_tag::Column::PostId.eq(post_id))
            .filter(post_tag::Column::TagId.is_in(removed))
            .exec(db)
            .await?;
    }

    let added: Vec<post_tag::ActiveModel> = tags
        .iter()
        .filter(|t| !current_ids.contains(&t.id))
        .map(|t| post_tag::ActiveModel {
            post_id: Set(post_id),
            tag_id: Set(t.id),
        })
        .collect();
    if !added.is_empty() {
        post_tag::Entity::insert_many(added).exec(db).await?;
    }

    Ok(())
}

/// Replaces the post set of a tag, the mirror of [`replace_post_tags`].
/// Both directions converge on the same posts_tags rows.
pub async fn replace_tag_posts<C: ConnectionTrait>(
    db: &C,
    tag_id: i32,
    posts: &[post::Model],
) -> Result<(), AppError> {
    let current = post_tag::Entity::find()
        .filter(post_tag::Column::TagId.eq(tag_id))
        .all(db)
        .await?;
    let current_ids: HashSet<i32> = current.iter().map(|row| row.post_id).collect();
    let target_ids: HashSet<i32> = posts.iter().map(|p| p.id).collect();

    let removed: Vec<i32> = current
        .iter()
        .filter(|row| !target_ids.contains(&row.post_id))
        .map(|row| row.post_id)
        .collect();
    if !removed.is_empty() {
        post_tag::Entity::delete_many()
            .filter(post_tag::Column::TagId.eq(tag_id))
            .filter(post_tag::Column::PostId.is_in(removed))
            .exec(db)
            .await?;
    }

    let added: Vec<post_tag::ActiveModel> = posts
        .iter()
        .filter(|p| !current_ids.contains(&p.id))
        .map(|p| post_tag::ActiveModel {
            post_id: Set(p.id),
            tag_id: Set(tag_id),
        })
        .collect();
    if !added.is_empty() {
        post_tag::Entity::insert_many(added).exec(db).await?;
    }

    Ok(())
}
