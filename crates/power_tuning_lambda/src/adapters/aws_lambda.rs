use async_trait::async_trait;
use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{InvocationType, LogType};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use power_tuning_core::contract::TargetRef;

use crate::adapters::function_control::{
    AliasDescription, FunctionControl, InvocationOutcome, PlatformError, PlatformErrorKind,
};

/// `FunctionControl` backed by the Lambda management and invoke APIs.
#[derive(Debug, Clone)]
pub struct AwsFunctionControl {
    lambda_client: aws_sdk_lambda::Client,
}

impl AwsFunctionControl {
    pub fn new(lambda_client: aws_sdk_lambda::Client) -> Self {
        Self { lambda_client }
    }
}

#[async_trait]
impl FunctionControl for AwsFunctionControl {
    async fn get_alias(
        &self,
        target: &TargetRef,
        alias_name: &str,
    ) -> Result<Option<AliasDescription>, PlatformError> {
        let result = self
            .lambda_client
            .get_alias()
            .function_name(target.as_str())
            .name(alias_name)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(AliasDescription {
                name: output.name().unwrap_or(alias_name).to_string(),
                version: output.function_version().unwrap_or_default().to_string(),
            })),
            Err(error) => {
                let error = classify_sdk_error(error);
                if error.is_not_found() {
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn get_memory_size(&self, target: &TargetRef) -> Result<u32, PlatformError> {
        let output = self
            .lambda_client
            .get_function_configuration()
            .function_name(target.as_str())
            .send()
            .await
            .map_err(classify_sdk_error)?;

        output
            .memory_size()
            .and_then(|memory| u32::try_from(memory).ok())
            .ok_or_else(|| {
                PlatformError::new(
                    PlatformErrorKind::Fatal,
                    format!("function configuration of {target} has no memory size"),
                )
            })
    }

    async fn set_memory_size(
        &self,
        target: &TargetRef,
        memory_mb: u32,
    ) -> Result<(), PlatformError> {
        let memory_mb = i32::try_from(memory_mb).map_err(|_| {
            PlatformError::new(
                PlatformErrorKind::Fatal,
                format!("memory size {memory_mb} is out of range"),
            )
        })?;

        self.lambda_client
            .update_function_configuration()
            .function_name(target.as_str())
            .memory_size(memory_mb)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_sdk_error)
    }

    async fn publish_version(&self, target: &TargetRef) -> Result<String, PlatformError> {
        let output = self
            .lambda_client
            .publish_version()
            .function_name(target.as_str())
            .send()
            .await
            .map_err(classify_sdk_error)?;

        output.version().map(str::to_string).ok_or_else(|| {
            PlatformError::new(
                PlatformErrorKind::Fatal,
                format!("publish_version for {target} returned no version"),
            )
        })
    }

    async fn create_alias(
        &self,
        target: &TargetRef,
        version: &str,
        alias_name: &str,
    ) -> Result<(), PlatformError> {
        self.lambda_client
            .create_alias()
            .function_name(target.as_str())
            .function_version(version)
            .name(alias_name)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_sdk_error)
    }

    async fn delete_alias(
        &self,
        target: &TargetRef,
        alias_name: &str,
    ) -> Result<(), PlatformError> {
        self.lambda_client
            .delete_alias()
            .function_name(target.as_str())
            .name(alias_name)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_sdk_error)
    }

    async fn delete_version(&self, target: &TargetRef, version: &str) -> Result<(), PlatformError> {
        self.lambda_client
            .delete_function()
            .function_name(target.as_str())
            .qualifier(version)
            .send()
            .await
            .map(|_| ())
            .map_err(classify_sdk_error)
    }

    async fn invoke(
        &self,
        target: &TargetRef,
        qualifier: Option<&str>,
        payload: &[u8],
    ) -> Result<InvocationOutcome, PlatformError> {
        let output = self
            .lambda_client
            .invoke()
            .function_name(target.as_str())
            .set_qualifier(qualifier.map(str::to_string))
            .invocation_type(InvocationType::RequestResponse)
            .log_type(LogType::Tail)
            .payload(Blob::new(payload.to_vec()))
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let log_tail = output
            .log_result()
            .map(decode_log_tail)
            .transpose()?;

        Ok(InvocationOutcome {
            log_tail,
            function_error: output.function_error().map(str::to_string),
            payload: output
                .payload()
                .map(|blob| blob.as_ref().to_vec())
                .unwrap_or_default(),
        })
    }
}

fn decode_log_tail(encoded: &str) -> Result<String, PlatformError> {
    STANDARD
        .decode(encoded)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|error| {
            PlatformError::new(
                PlatformErrorKind::Fatal,
                format!("invocation log tail is not valid base64: {error}"),
            )
        })
}

fn classify_sdk_error<E, R>(error: SdkError<E, R>) -> PlatformError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            PlatformErrorKind::Transient
        }
        _ => kind_for_error_code(error.code()),
    };
    PlatformError::new(kind, DisplayErrorContext(&error).to_string())
}

fn kind_for_error_code(code: Option<&str>) -> PlatformErrorKind {
    match code {
        Some("ResourceNotFoundException") => PlatformErrorKind::NotFound,
        Some("ResourceConflictException") => PlatformErrorKind::Conflict,
        Some(
            "TooManyRequestsException"
            | "ThrottlingException"
            | "ServiceException"
            | "ResourceNotReadyException"
            | "EC2ThrottledException"
            | "RequestTimeout",
        ) => PlatformErrorKind::Transient,
        _ => PlatformErrorKind::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_lambda_error_codes() {
        assert_eq!(
            kind_for_error_code(Some("ResourceNotFoundException")),
            PlatformErrorKind::NotFound
        );
        assert_eq!(
            kind_for_error_code(Some("ResourceConflictException")),
            PlatformErrorKind::Conflict
        );
        assert_eq!(
            kind_for_error_code(Some("TooManyRequestsException")),
            PlatformErrorKind::Transient
        );
        assert_eq!(
            kind_for_error_code(Some("AccessDeniedException")),
            PlatformErrorKind::Fatal
        );
        assert_eq!(kind_for_error_code(None), PlatformErrorKind::Fatal);
    }

    #[test]
    fn decodes_base64_log_tail() {
        let encoded = STANDARD.encode("REPORT RequestId: 1\tDuration: 2.00 ms\t");
        let decoded = decode_log_tail(&encoded).expect("tail should decode");
        assert!(decoded.starts_with("REPORT"));

        let error = decode_log_tail("%%%").expect_err("invalid base64 should fail");
        assert_eq!(error.kind, PlatformErrorKind::Fatal);
    }
}
