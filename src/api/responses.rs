//! Shared API response types
//!
//! Wire shapes use camelCase keys. Posts are rendered as cards with the
//! category slug and a compact author object.

use serde::{Deserialize, Serialize};

use crate::models::{ContactForm, PagedResult, PostWithMeta, User};

/// Author info embedded in a post card
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostAuthor {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCard {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub desc: String,
    pub content: String,
    pub img: Option<String>,
    /// Category slug
    pub category: String,
    pub category_name: String,
    pub user: PostAuthor,
    pub is_featured: bool,
    pub visit: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PostWithMeta> for PostCard {
    fn from(meta: PostWithMeta) -> Self {
        let post = meta.post;
        Self {
            id: post.id,
            slug: post.slug,
            title: post.title,
            desc: post.description,
            content: post.content,
            img: post.img,
            category: meta.category_slug,
            category_name: meta.category_name,
            user: PostAuthor {
                id: post.author_id,
                username: meta.author_username,
            },
            is_featured: post.is_featured,
            visit: post.visit_count,
            created_at: post.created_at.to_rfc3339(),
            updated_at: post.updated_at.to_rfc3339(),
        }
    }
}

/// `GET /posts`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListResponse {
    pub posts: Vec<PostCard>,
    pub has_more: bool,
    pub total: i64,
    pub page: u32,
}

impl From<PagedResult<PostWithMeta>> for PostListResponse {
    fn from(result: PagedResult<PostWithMeta>) -> Self {
        let has_more = result.has_more();
        Self {
            posts: result.items.into_iter().map(PostCard::from).collect(),
            has_more,
            total: result.total,
            page: result.page,
        }
    }
}

/// `GET /api/user-posts` and `/api/user-posts/all`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPostsResponse {
    pub posts: Vec<PostCard>,
    pub has_more: bool,
    pub total_posts: i64,
    pub page: u32,
}

impl From<PagedResult<PostWithMeta>> for UserPostsResponse {
    fn from(result: PagedResult<PostWithMeta>) -> Self {
        let has_more = result.has_more();
        Self {
            posts: result.items.into_iter().map(PostCard::from).collect(),
            has_more,
            total_posts: result.total,
            page: result.page,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFormResponse {
    pub id: i64,
    pub parent_name: String,
    pub parent_surname: String,
    pub child_name: String,
    pub child_gender: String,
    pub child_age: i32,
    pub child_birth_date: Option<String>,
    pub contact_phone: String,
    pub contact_email: String,
    pub consultation_reason: String,
    pub post_id: Option<i64>,
    pub post_title: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<ContactForm> for ContactFormResponse {
    fn from(form: ContactForm) -> Self {
        Self {
            id: form.id,
            parent_name: form.parent_name,
            parent_surname: form.parent_surname,
            child_name: form.child_name,
            child_gender: form.child_gender,
            child_age: form.child_age,
            child_birth_date: form.child_birth_date,
            contact_phone: form.contact_phone,
            contact_email: form.contact_email,
            consultation_reason: form.consultation_reason,
            post_id: form.post_id,
            post_title: form.post_title,
            status: form.status.to_string(),
            created_at: form.created_at.to_rfc3339(),
        }
    }
}

/// `GET /api/contact-forms`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFormListResponse {
    pub forms: Vec<ContactFormResponse>,
    pub has_more: bool,
    pub total_forms: i64,
    pub page: u32,
}

impl From<PagedResult<ContactForm>> for ContactFormListResponse {
    fn from(result: PagedResult<ContactForm>) -> Self {
        let has_more = result.has_more();
        Self {
            forms: result.items.into_iter().map(ContactFormResponse::from).collect(),
            has_more,
            total_forms: result.total,
            page: result.page,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;

    fn meta() -> PostWithMeta {
        let mut post = Post::new(
            "fever".into(),
            "Fever".into(),
            "When to worry".into(),
            "Body".into(),
            Some("https://img.example.org/f.jpg".into()),
            4,
            9,
        );
        post.id = 12;
        post.visit_count = 30;
        PostWithMeta {
            post,
            category_slug: "symptoms".into(),
            category_name: "Symptoms".into(),
            author_username: "ana".into(),
        }
    }

    #[test]
    fn test_post_card_wire_shape() {
        let json = serde_json::to_value(PostCard::from(meta())).unwrap();
        assert_eq!(json["desc"], "When to worry");
        assert_eq!(json["category"], "symptoms");
        assert_eq!(json["user"]["username"], "ana");
        assert_eq!(json["user"]["id"], 9);
        assert_eq!(json["isFeatured"], false);
        assert_eq!(json["visit"], 30);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_user_posts_response_keys() {
        let params = crate::models::ListParams::new(1, 1);
        let page = PagedResult::new(vec![meta()], 3, &params);
        let json = serde_json::to_value(UserPostsResponse::from(page)).unwrap();
        assert_eq!(json["totalPosts"], 3);
        assert_eq!(json["hasMore"], true);
        assert_eq!(json["posts"].as_array().unwrap().len(), 1);
    }
}
