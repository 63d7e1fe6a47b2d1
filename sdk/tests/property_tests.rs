use proptest::prelude::*;
use sdk::errors::{ChorusErrorExt, EngineError};
use sdk::gateway::MessageId;

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        // Every variant must produce a non-empty static hint that never
        // echoes the raw payload back to the channel.
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Validation(error_str.clone()),
            EngineError::Gateway(error_str.clone()),
            EngineError::Completion(error_str.clone()),
            EngineError::Network(error_str.clone()),
            EngineError::SecretNotFound(error_str.clone()),
            EngineError::PromptLoad { persona: error_str.clone(), reason: error_str.clone() },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 12 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

proptest! {
    #[test]
    fn test_message_id_numeric_string_equivalence(id in any::<u64>()) {
        let from_number = MessageId::from_json(&serde_json::json!(id));
        let from_string = MessageId::from_json(&serde_json::json!(id.to_string()));
        prop_assert_eq!(from_number.clone(), from_string);
        prop_assert_eq!(from_number, Some(MessageId::from(id)));
    }
}
