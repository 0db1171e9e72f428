use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub fn create_middleware_stack(router: axum::Router) -> axum::Router {
    router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
