use sea_orm::entity::prelude::*;

pub const DEFAULT_IMAGE_URL: &str = "https://www.freeiconspng.com/img/1688";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub image_url: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::post::Entity")]
    Post,
}

impl Related<super::post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_joins_with_single_space() {
        let user = Model {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            image_url: DEFAULT_IMAGE_URL.to_string(),
        };
        assert_eq!(user.full_name(), "Ada Lovelace");
    }
}
