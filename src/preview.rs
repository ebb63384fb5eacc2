//! Pre-flight template validation against the content previewer.

use crate::client::SparkpostClient;
use crate::error::{Result, ValidationError};
use crate::payload::{Preview, Transmission};
use tracing::{debug, warn};

/// Status returned when the API key lacks the `Templates: Preview` permission.
const PREVIEW_FORBIDDEN: u16 = 403;

/// Ask the vendor to render the transmission with the first recipient's
/// substitution data. Only an error reported in the body fails the check;
/// a missing preview permission or any other failed status logs a warning.
pub async fn check_template(client: &SparkpostClient, transmission: &Transmission) -> Result<()> {
    let preview = Preview::from_transmission(transmission);
    let response = client.preview(&preview).await?;

    if response.status == PREVIEW_FORBIDDEN {
        warn!(
            "The permission 'Templates: Preview' is not enabled for this API key; \
             enable it to validate templates before sending"
        );
        return Ok(());
    }

    if let Some(message) = response.body.error_message() {
        return Err(ValidationError::TemplateInvalid(message.to_string()).into());
    }

    if !response.is_success() {
        warn!(
            "Template preview returned HTTP {} without an error; sending anyway",
            response.status
        );
        return Ok(());
    }

    debug!("Template preview accepted");
    Ok(())
}
