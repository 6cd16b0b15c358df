use feed_cache::Searchable;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub user_id: u64,
    pub id: u64,
    pub title: String,
    pub body: String,
}

impl Post {
    /// `[id] TITLE`
    pub fn pretty_title(&self) -> String {
        format!("[{}] {}", self.id, self.title.to_uppercase())
    }
}

impl Searchable for Post {
    fn search_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub post_id: u64,
    pub id: u64,
    pub name: String,
    pub email: String,
    pub body: String,
}

impl Comment {
    pub fn pretty_email(&self) -> String {
        self.email.to_lowercase()
    }
}

impl Searchable for Comment {
    fn search_text(&self) -> String {
        format!("{} {} {}", self.name, self.email, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Post {
        Post {
            user_id: 1,
            id: 7,
            title: "qui est esse".to_string(),
            body: "est rerum tempore vitae".to_string(),
        }
    }

    #[test]
    fn test_pretty_title() {
        assert_eq!(post().pretty_title(), "[7] QUI EST ESSE");
    }

    #[test]
    fn test_post_search_text_joins_title_and_body() {
        assert_eq!(post().search_text(), "qui est esse est rerum tempore vitae");
    }

    #[test]
    fn test_comment_deserializes_camel_case() {
        let json = r#"{
            "postId": 1,
            "id": 3,
            "name": "odio adipisci rerum",
            "email": "Nikita@Garfield.biz",
            "body": "quia molestiae reprehenderit"
        }"#;

        let comment: Comment = serde_json::from_str(json).unwrap();
        assert_eq!(comment.post_id, 1);
        assert_eq!(comment.pretty_email(), "nikita@garfield.biz");
        assert!(comment.search_text().contains("Nikita@Garfield.biz"));
    }
}
