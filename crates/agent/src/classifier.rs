//! Message classification.
//!
//! One deterministic (temperature 0) JSON-object call per task. The result
//! is advisory: any failure, including a timeout, yields
//! [`Classification::fallback`] and the pipeline carries on.

use hearth_core::classification::Classification;
use hearth_core::structured::schema_for;
use tracing::{debug, warn};

use crate::generation::Generator;

const SYSTEM_PROMPT: &str = "You classify messages sent to a household assistant. \
Users write in Russian or English about purchases, income, tasks, reminders, meetings and notes, \
and also ask questions about what they logged or just chat.\n\
Respond with a single JSON object and nothing else:\n\
{\"messageType\": {\"type\": \"question\" | \"event\" | \"chat\" | \"irrelevant\", \
\"subtype\": string or null (purchase, income, task, reminder, meeting, note, statistics, greeting), \
\"confidence\": number from 0 to 1, \
\"needLogging\": true if the message states something that should be recorded}, \
\"relevance\": {\"relevant\": true if the message concerns the household, \
\"score\": number from 0 to 1, \"category\": string or null}}";

pub struct Classifier {
    generator: Generator,
}

impl Classifier {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// Classify `text`. Never fails.
    pub async fn classify(&self, text: &str) -> Classification {
        let value = match self.generator.object(SYSTEM_PROMPT, text, &schema_for::<Classification>(), 0.0).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Classification failed, using fallback");
                return Classification::fallback();
            }
        };

        match serde_json::from_value::<Classification>(value) {
            Ok(classification) => {
                debug!(
                    kind = classification.kind().as_str(),
                    confidence = classification.message_type.confidence,
                    relevant = classification.relevance.relevant,
                    "Classified message"
                );
                classification
            }
            Err(e) => {
                warn!(error = %e, "Classification did not deserialize, using fallback");
                Classification::fallback()
            }
        }
    }
}
