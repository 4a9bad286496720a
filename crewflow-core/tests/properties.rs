//! Property-based tests for scoring and parsing invariants
//!
//! Randomly generated content and model replies must never push a
//! confidence score out of [0.0, 1.0], produce a zero time estimate, or
//! panic the classifier's payload parser.

use std::sync::Arc;

use proptest::prelude::*;

use crewflow_core::agent::AgentBehavior;
use crewflow_core::agents::{
    FieldServiceBehavior, ManagerBehavior, SalesBehavior, SupportBehavior,
};
use crewflow_core::intent::IntentClassifier;
use crewflow_core::model::MockModelClient;
use crewflow_core::registry::AgentRegistry;
use crewflow_core::request::{AgentResponse, UserRequest};
use crewflow_core::router::Router;

/// Strategy for request content: mixed ASCII and CJK, never blank.
fn content_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 ?价格购买问题故障维修战略管理]{0,79}").unwrap()
}

fn behaviors() -> Vec<Box<dyn AgentBehavior>> {
    vec![
        Box::new(SalesBehavior::new(Arc::new(MockModelClient::new()))),
        Box::new(SupportBehavior::new(Arc::new(MockModelClient::new()))),
        Box::new(FieldServiceBehavior::new(Arc::new(MockModelClient::new()))),
        Box::new(ManagerBehavior::new(Arc::new(MockModelClient::new()))),
    ]
}

proptest! {
    #[test]
    fn response_confidence_always_clamped(confidence in -10.0f64..10.0) {
        let response = AgentResponse::new(
            "agent",
            crewflow_core::agent::AgentType::Sales,
            "content",
            confidence,
        );
        prop_assert!((0.0..=1.0).contains(&response.confidence));
    }

    #[test]
    fn behavior_scores_stay_in_unit_interval(content in content_strategy()) {
        let request = UserRequest::new(content).unwrap();
        for behavior in behaviors() {
            let score = tokio_test::block_on(behavior.can_handle(&request));
            prop_assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn support_never_declines(content in content_strategy()) {
        let support = SupportBehavior::new(Arc::new(MockModelClient::new()));
        let request = UserRequest::new(content).unwrap();
        let score = tokio_test::block_on(support.can_handle(&request));
        prop_assert!(score >= 0.2);
    }

    #[test]
    fn time_estimates_are_positive(content in content_strategy()) {
        let request = UserRequest::new(content).unwrap();
        for behavior in behaviors() {
            prop_assert!(behavior.estimate_processing_time(&request) > 0);
        }
    }

    #[test]
    fn classifier_survives_arbitrary_model_replies(reply in ".{0,200}") {
        let classifier =
            IntentClassifier::new(Arc::new(MockModelClient::new().with_reply(reply)));
        let request = UserRequest::new("hello".to_string()).unwrap();
        let result = tokio_test::block_on(classifier.analyze(&request));
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn content_complexity_stays_in_unit_interval(content in ".{1,400}") {
        let classifier = IntentClassifier::new(Arc::new(MockModelClient::new()));
        let router = Router::new(classifier, Arc::new(AgentRegistry::new()));
        let score = router.content_complexity(&content);
        prop_assert!((0.0..=1.0).contains(&score));
    }
}
