//! Prompt assembly for review replies

use crate::models::{Cabinet, Review};

/// System instruction: default prompt, then cabinet rules, then examples
pub fn system_prompt(default_prompt: &str, cabinet: &Cabinet) -> String {
    let examples = cabinet
        .prompt_examples
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| format!("Примеры ответов:\n{}", e));

    [
        Some(default_prompt.trim().to_string()),
        cabinet.prompt_rules.as_deref().map(|r| r.trim().to_string()),
        examples,
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// User message describing the review being answered
pub fn user_message(review: &Review) -> String {
    let mut lines = vec![format!("Оценка: {}/5", review.rating)];

    if let Some(product) = non_empty(&review.product_name) {
        lines.push(format!("Товар: {}", product));
    }
    if let Some(author) = non_empty(&review.author_name) {
        lines.push(format!("Покупатель: {}", author));
    }
    if let Some(text) = non_empty(&review.text) {
        lines.push(format!("Отзыв: {}", text));
    }
    if let Some(pros) = non_empty(&review.pros) {
        lines.push(format!("Достоинства: {}", pros));
    }
    if let Some(cons) = non_empty(&review.cons) {
        lines.push(format!("Недостатки: {}", cons));
    }
    if let Some(attachments) = describe_attachments(review.photo_urls.len(), review.has_video) {
        lines.push(format!("Вложения: {}", attachments));
    }

    lines.join("\n")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Human-readable attachment summary, e.g. "2 фотографии и видео"
pub fn describe_attachments(photos: usize, has_video: bool) -> Option<String> {
    match (photos, has_video) {
        (0, false) => None,
        (0, true) => Some("видео".to_string()),
        (n, video) => {
            let noun = photo_noun(n);
            let suffix = if video { " и видео" } else { "" };
            Some(format!("{} {}{}", n, noun, suffix))
        }
    }
}

fn photo_noun(n: usize) -> &'static str {
    let tens = n % 100;
    match n % 10 {
        1 if tens != 11 => "фотография",
        2..=4 if !(12..=14).contains(&tens) => "фотографии",
        _ => "фотографий",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn cabinet(rules: Option<&str>, examples: Option<&str>) -> Cabinet {
        Cabinet {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Shop".to_string(),
            api_key: Some("key".to_string()),
            api_key_valid: true,
            prompt_rules: rules.map(String::from),
            prompt_examples: examples.map(String::from),
            auto_reply_enabled: false,
            auto_reply_min_rating: 5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_attachment_plurals() {
        assert_eq!(describe_attachments(0, false), None);
        assert_eq!(describe_attachments(0, true).as_deref(), Some("видео"));
        assert_eq!(describe_attachments(1, false).as_deref(), Some("1 фотография"));
        assert_eq!(
            describe_attachments(2, true).as_deref(),
            Some("2 фотографии и видео")
        );
        assert_eq!(describe_attachments(5, false).as_deref(), Some("5 фотографий"));
        assert_eq!(describe_attachments(11, false).as_deref(), Some("11 фотографий"));
        assert_eq!(describe_attachments(12, false).as_deref(), Some("12 фотографий"));
        assert_eq!(describe_attachments(21, false).as_deref(), Some("21 фотография"));
        assert_eq!(describe_attachments(23, false).as_deref(), Some("23 фотографии"));
    }

    #[test]
    fn test_system_prompt_layer_order() {
        let prompt = system_prompt("Base", &cabinet(Some("Rules"), Some("Example")));
        assert_eq!(prompt, "Base\n\nRules\n\nПримеры ответов:\nExample");

        let prompt = system_prompt("Base", &cabinet(None, None));
        assert_eq!(prompt, "Base");
    }

    #[test]
    fn test_user_message_contents() {
        let review = Review {
            id: Uuid::new_v4(),
            cabinet_id: Uuid::new_v4(),
            external_id: "r1".to_string(),
            rating: 4,
            author_name: None,
            text: Some("Хорошая кружка".to_string()),
            pros: Some("  ".to_string()),
            cons: None,
            product_name: Some("Кружка".to_string()),
            product_article: None,
            photo_urls: vec!["a".to_string(), "b".to_string()],
            has_video: true,
            status: ReviewStatus::New,
            ai_draft: None,
            sent_answer: None,
            review_created_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let message = user_message(&review);
        assert!(message.starts_with("Оценка: 4/5"));
        assert!(message.contains("Товар: Кружка"));
        assert!(message.contains("Вложения: 2 фотографии и видео"));
        assert!(!message.contains("Достоинства"));
    }
}
