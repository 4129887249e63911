//! CRD conversion webhook for ClusterPodPlacementConfig.

use crds::conversion::convert_object;
use kube::core::Status;
use kube::core::conversion::{ConversionRequest, ConversionResponse, ConversionReview};
use tracing::{debug, warn};

/// Converts every object of `review` to the requested version.
///
/// The whole batch fails when a single object fails, as the API server expects.
#[must_use]
pub fn convert(review: ConversionReview) -> ConversionReview {
    let request = match ConversionRequest::from_review(review) {
        Ok(request) => request,
        Err(e) => {
            return ConversionResponse::invalid(Status::failure(&e.to_string(), "InvalidRequest")).into_review();
        }
    };
    let desired = request.desired_api_version.clone();
    debug!("Converting {} object(s) to {}", request.objects.len(), desired);

    let converted: Result<Vec<_>, _> = request
        .objects
        .iter()
        .cloned()
        .map(|object| convert_object(object, &desired))
        .collect();

    let response = ConversionResponse::for_request(request);
    match converted {
        Ok(converted_objects) => response.success(converted_objects),
        Err(e) => {
            warn!("Conversion to {} failed: {}", desired, e);
            response.failure(Status::failure(&e.to_string(), "ConversionFailed"))
        }
    }
    .into_review()
}
