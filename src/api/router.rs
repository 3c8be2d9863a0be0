//! Route table.
//!
//! Paths served to more than one role live in the authenticated group and
//! check the role inside the handler. Teacher-only and student-only groups
//! carry a role gate as a route layer. Everything except the public group
//! sits behind the token gate.

use axum::{
    middleware::{from_fn, from_fn_with_state, map_response},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    activities, admin, auth, classes, clients, demo_requests, growth_spaces, health, messages,
    notifications, rewards, surveys, users,
};
use super::middleware::{expose_internal_errors, require_auth, require_student, require_teacher};
use super::types::AppState;

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // GET authenticates inside the handler.
        .route(
            "/demo-requests",
            post(demo_requests::create_demo_request).get(demo_requests::list_demo_requests),
        )
}

fn shared_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/password", put(auth::change_password))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/classes",
            get(classes::list_classes).post(classes::create_class),
        )
        .route(
            "/classes/:code",
            get(classes::get_class)
                .put(classes::update_class)
                .delete(classes::delete_class),
        )
        .route("/surveys/:id", get(surveys::get_survey))
        .route("/messages", get(messages::inbox).post(messages::send_message))
        .route(
            "/growth-spaces/:id",
            get(growth_spaces::get_space)
                .put(growth_spaces::update_space)
                .delete(growth_spaces::delete_space),
        )
        .route(
            "/growth-spaces/:id/analysis",
            get(growth_spaces::list_analyses).post(growth_spaces::add_analysis),
        )
}

fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list_users))
        .route("/classes/:code/students", get(classes::class_students))
        .route("/surveys/class/:code", get(surveys::class_surveys))
        .route("/activities/student/:id", get(activities::student_activities))
        .route("/messages/:id/read", put(messages::mark_read))
        .route("/messages/:id/reply", put(messages::reply))
        .route(
            "/notifications",
            get(notifications::list_notifications).post(notifications::create_notification),
        )
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/notifications/:id/read", put(notifications::mark_read))
        .route(
            "/notifications/:id",
            delete(notifications::delete_notification),
        )
        .route("/rewards", post(rewards::award_reward))
        .route("/rewards/student/:id", get(rewards::student_rewards))
        .route("/rewards/:id", delete(rewards::delete_reward))
        .route("/growth-spaces/student/:id", get(growth_spaces::student_spaces))
        .route("/demo-requests/:id/status", put(demo_requests::update_status))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/clients", get(admin::clients))
        .route("/admin/wellbeing", get(admin::wellbeing))
        .route("/admin/demo-requests", get(admin::demo_requests_overview))
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/:id",
            get(clients::get_client)
                .put(clients::update_client)
                .delete(clients::delete_client),
        )
        .route("/clients/:id/import", post(clients::import_users))
        .route_layer(from_fn(require_teacher))
}

fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/classes/join", post(classes::join_class))
        .route("/classes/leave", post(classes::leave_class))
        .route("/surveys", post(surveys::create_survey))
        .route("/surveys/mine", get(surveys::my_surveys))
        .route("/activities", post(activities::create_activity))
        .route("/activities/mine", get(activities::my_activities))
        .route("/messages/mine", get(messages::my_messages))
        .route("/rewards/mine", get(rewards::my_rewards))
        .route("/growth-spaces", post(growth_spaces::create_space))
        .route("/growth-spaces/mine", get(growth_spaces::my_spaces))
        .route_layer(from_fn(require_student))
}

/// Builds the full application router.
pub fn create_router(state: AppState) -> Router {
    let authed = Router::new()
        .merge(shared_routes())
        .merge(teacher_routes())
        .merge(student_routes())
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = Router::new().merge(public_routes()).merge(authed);

    let mut router = Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http());
    if state.config.is_development() {
        router = router.layer(map_response(expose_internal_errors));
    }
    if state.config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router.with_state(state)
}
