mod test_support;

use axum::http::StatusCode;
use serde_json::{json, Value};
use test_support::{assert_status, create_class, data, get, post, spawn_app, student, teacher, Account, TestApp};

struct School {
    owner: Account,
    rosa: Account,
    luis: Account,
    ana: Account,
    rosa_class: String,
}

/// andino.edu.pe teacher Rosa teaches ana@andino and bo@gmail.
/// otro.org teacher Luis teaches cy@andino.
async fn seed(app: &TestApp) -> School {
    let owner = teacher(&app.server, "Owner", "munay@munay.com").await;
    let rosa = teacher(&app.server, "Rosa", "rosa@andino.edu.pe").await;
    let luis = teacher(&app.server, "Luis", "luis@otro.org").await;
    let rosa_class = create_class(&app.server, &rosa, "5A").await;
    let luis_class = create_class(&app.server, &luis, "6B").await;
    let ana = student(&app.server, "Ana", "ana@andino.edu.pe", Some(&rosa_class)).await;
    student(&app.server, "Bo", "bo@gmail.com", Some(&rosa_class)).await;
    student(&app.server, "Cy", "cy@andino.edu.pe", Some(&luis_class)).await;
    School {
        owner,
        rosa,
        luis,
        ana,
        rosa_class,
    }
}

fn domain<'a>(domains: &'a Value, name: &str) -> &'a Value {
    domains
        .as_array()
        .expect("domains")
        .iter()
        .find(|d| d["domain"] == name)
        .unwrap_or_else(|| panic!("domain {name} missing from {domains}"))
}

#[tokio::test]
async fn students_are_double_counted_across_email_and_class_membership() {
    let app = spawn_app();
    let school = seed(&app).await;

    let dashboard = data(&get(&app.server, "/api/admin/dashboard", &school.owner.token).await);
    assert_eq!(dashboard["isOwner"], true);
    let domains = &dashboard["domains"];
    let names: Vec<&str> = domains
        .as_array()
        .expect("domains")
        .iter()
        .filter_map(|d| d["domain"].as_str())
        .collect();
    assert_eq!(names, vec!["andino.edu.pe", "munay.com", "otro.org"]);

    // Email matches: ana, cy. Class membership under andino teachers: ana, bo.
    // Ana is counted twice; three distinct students yield four.
    let andino = domain(domains, "andino.edu.pe");
    assert_eq!(andino["teachers"], 1);
    assert_eq!(andino["students"], 4);
    assert_eq!(andino["classes"], 1);

    // Cy is counted again here through Luis's class.
    let otro = domain(domains, "otro.org");
    assert_eq!(otro["students"], 1);

    let sum: i64 = domains
        .as_array()
        .expect("domains")
        .iter()
        .filter_map(|d| d["students"].as_i64())
        .sum();
    assert_eq!(dashboard["totals"]["students"], 3);
    assert_eq!(sum, 5);
}

#[tokio::test]
async fn non_owner_sees_only_their_own_domain() {
    let app = spawn_app();
    let school = seed(&app).await;

    let dashboard = data(&get(&app.server, "/api/admin/dashboard", &school.rosa.token).await);
    assert_eq!(dashboard["isOwner"], false);
    assert_eq!(dashboard["totals"], Value::Null);
    let domains = dashboard["domains"].as_array().expect("domains");
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0]["domain"], "andino.edu.pe");

    let clients = data(&get(&app.server, "/api/admin/clients", &school.luis.token).await);
    let clients = clients.as_array().expect("clients");
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["domain"], "otro.org");
    assert_eq!(clients[0]["teachers"][0]["email"], "luis@otro.org");

    let all = data(&get(&app.server, "/api/admin/clients", &school.owner.token).await);
    assert_eq!(all.as_array().expect("clients").len(), 3);
}

#[tokio::test]
async fn wellbeing_score_averages_unnormalized_sources() {
    let app = spawn_app();
    let school = seed(&app).await;

    let response = post(
        &app.server,
        "/api/surveys",
        &school.ana.token,
        json!({ "surveyType": "daily", "moodScore": 8 }),
    )
    .await;
    assert_status(&response, StatusCode::CREATED);
    let response = post(
        &app.server,
        "/api/activities",
        &school.ana.token,
        json!({ "activityType": "breathing", "title": "Box breathing", "score": 60 }),
    )
    .await;
    assert_status(&response, StatusCode::CREATED);

    let wellbeing = data(&get(&app.server, "/api/admin/wellbeing", &school.rosa.token).await);
    assert_eq!(wellbeing["scope"], "andino.edu.pe");
    assert_eq!(wellbeing["overall"]["inputs"]["surveyMood"], 8.0);
    assert_eq!(wellbeing["overall"]["inputs"]["activityScore"], 60.0);
    assert_eq!(wellbeing["overall"]["inputs"]["reflectionSentiment"], Value::Null);
    assert_eq!(wellbeing["overall"]["score"], 34.0);

    let classes = wellbeing["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["classCode"], school.rosa_class.as_str());
    assert_eq!(classes[0]["score"], 34.0);

    let luis_view = data(&get(&app.server, "/api/admin/wellbeing", &school.luis.token).await);
    assert_eq!(luis_view["overall"]["score"], Value::Null);

    let owner_view = data(&get(&app.server, "/api/admin/wellbeing", &school.owner.token).await);
    assert_eq!(owner_view["scope"], "all");
    assert_eq!(owner_view["classes"].as_array().expect("classes").len(), 2);
}

#[tokio::test]
async fn demo_request_overview_is_owner_only() {
    let app = spawn_app();
    let school = seed(&app).await;
    for school_name in ["Colegio Sol", "Colegio Luna"] {
        let response = app
            .server
            .post("/api/demo-requests")
            .json(&json!({ "name": "Dir", "email": "dir@sol.pe", "school": school_name }))
            .await;
        assert_status(&response, StatusCode::CREATED);
    }

    let response = get(&app.server, "/api/admin/demo-requests", &school.rosa.token).await;
    assert_status(&response, StatusCode::FORBIDDEN);

    let overview = data(&get(&app.server, "/api/admin/demo-requests", &school.owner.token).await);
    assert_eq!(overview["total"], 2);
    assert_eq!(overview["byStatus"]["pending"], 2);
    assert_eq!(overview["byStatus"]["closed"], 0);
    assert_eq!(overview["recent"].as_array().expect("recent").len(), 2);
}
