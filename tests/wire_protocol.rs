use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use seatbook::engine::Engine;
use seatbook::store::WalStore;
use seatbook::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("seatbook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = WalStore::open(&dir.join("seatbook.wal")).unwrap();
    let engine = Arc::new(Engine::new(Arc::new(store)));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    addr
}

struct Client {
    framed: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.unwrap();
        Self { framed: Framed::new(socket, LinesCodec::new()) }
    }

    async fn send_raw(&mut self, line: &str) -> Value {
        self.framed.send(line.to_string()).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), self.framed.next())
            .await
            .expect("response timed out")
            .expect("connection closed")
            .unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    async fn call(&mut self, request: Value) -> Value {
        self.send_raw(&request.to_string()).await
    }

    /// Call and unwrap a successful response's data.
    async fn ok(&mut self, request: Value) -> Value {
        let resp = self.call(request).await;
        assert_eq!(resp["ok"], true, "unexpected failure: {resp}");
        resp["data"].clone()
    }

    /// Call and return the error kind of a failed response.
    async fn err(&mut self, request: Value) -> String {
        let resp = self.call(request).await;
        assert_eq!(resp["ok"], false, "unexpected success: {resp}");
        assert!(resp["error"].is_string());
        resp["kind"].as_str().unwrap().to_string()
    }
}

fn date(offset: i64) -> String {
    (chrono::Local::now().date_naive() + chrono::Duration::days(offset)).to_string()
}

/// Restaurant with a two-top and a four-top. Returns (admin, restaurant id).
async fn setup(client: &mut Client) -> (String, String) {
    let admin = Ulid::new().to_string();
    let restaurant = client
        .ok(json!({
            "op": "create_restaurant", "admin_id": admin,
            "name": "Wire Bistro", "grid_rows": 4, "grid_cols": 4
        }))
        .await;
    for (label, capacity, col) in [("A", 2, 0), ("B", 4, 1)] {
        client
            .ok(json!({
                "op": "add_table", "admin_id": admin, "label": label,
                "capacity": capacity, "grid_row": 0, "grid_col": col
            }))
            .await;
    }
    (admin, restaurant["id"].as_str().unwrap().to_string())
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn reservation_lifecycle_over_the_wire() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let (admin, restaurant_id) = setup(&mut client).await;
    let customer = Ulid::new().to_string();

    let avail = client
        .ok(json!({
            "op": "check_availability", "restaurant_id": restaurant_id,
            "date": date(1), "time": "19:00", "guests": 6
        }))
        .await;
    assert_eq!(avail, json!({ "available": true, "tables_needed": 2, "assigned_capacity": 6 }));

    let created = client
        .ok(json!({
            "op": "create_reservation", "customer_id": customer,
            "restaurant_id": restaurant_id, "date": date(1),
            "start_time": "19:00", "guest_count": 3, "note": "window please"
        }))
        .await;
    assert_eq!(created["status"], "PENDING");
    assert_eq!(created["start_time"], "19:00");
    assert_eq!(created["end_time"], "21:00");
    assert_eq!(created["date"], date(1));
    assert_eq!(created["tables"][0]["label"], "B");
    let id = created["id"].as_str().unwrap().to_string();

    let modified = client
        .ok(json!({
            "op": "modify_reservation", "customer_id": customer,
            "reservation_id": id, "guest_count": 2
        }))
        .await;
    assert_eq!(modified["guest_count"], 2);
    assert_eq!(modified["tables"][0]["label"], "A");
    assert_eq!(modified["note"], "window please");

    let confirmed = client
        .ok(json!({
            "op": "change_status", "admin_id": admin,
            "reservation_id": id, "status": "CONFIRMED"
        }))
        .await;
    assert_eq!(confirmed["status"], "CONFIRMED");

    let kind = client
        .err(json!({
            "op": "modify_reservation", "customer_id": customer,
            "reservation_id": id, "guest_count": 4
        }))
        .await;
    assert_eq!(kind, "forbidden_transition");

    let listed = client
        .ok(json!({ "op": "list_reservations", "customer_id": customer }))
        .await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["page"], 1);
    assert_eq!(listed["limit"], 10);
    assert_eq!(listed["data"][0]["id"], id.as_str());

    let cancelled = client
        .ok(json!({ "op": "cancel_reservation", "customer_id": customer, "reservation_id": id }))
        .await;
    assert_eq!(cancelled["status"], "CANCELLED");

    let kind = client
        .err(json!({ "op": "cancel_reservation", "customer_id": customer, "reservation_id": id }))
        .await;
    assert_eq!(kind, "forbidden_transition");

    let book = client
        .ok(json!({
            "op": "admin_list_reservations", "admin_id": admin,
            "status": "CANCELLED", "date": date(1)
        }))
        .await;
    assert_eq!(book["total"], 1);
}

#[tokio::test]
async fn errors_are_classified() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let (admin, restaurant_id) = setup(&mut client).await;
    let customer = Ulid::new().to_string();

    let create = |start: &str, guests: u32, day: i64| {
        json!({
            "op": "create_reservation", "customer_id": customer,
            "restaurant_id": restaurant_id, "date": date(day),
            "start_time": start, "guest_count": guests
        })
    };

    assert_eq!(client.err(create("08:00", 2, 1)).await, "validation");
    assert_eq!(client.err(create("19:00", 13, 1)).await, "validation");
    assert_eq!(client.err(create("19:00", 2, -1)).await, "validation");
    assert_eq!(client.err(create("22:00", 2, 1)).await, "validation");
    assert_eq!(client.err(create("19:00", 7, 1)).await, "conflict");

    client.ok(create("19:00", 6, 1)).await;
    assert_eq!(client.err(create("20:00", 1, 1)).await, "conflict");

    let kind = client
        .err(json!({
            "op": "get_reservation", "customer_id": customer,
            "reservation_id": Ulid::new().to_string()
        }))
        .await;
    assert_eq!(kind, "not_found");

    let kind = client
        .err(json!({
            "op": "add_table", "admin_id": admin, "label": "A",
            "capacity": 2, "grid_row": 3, "grid_col": 3
        }))
        .await;
    assert_eq!(kind, "conflict");

    let kind = client
        .err(json!({ "op": "create_restaurant", "admin_id": admin, "name": "Again", "grid_rows": 1, "grid_cols": 1 }))
        .await;
    assert_eq!(kind, "conflict");
}

#[tokio::test]
async fn malformed_lines_keep_the_connection_open() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;

    for line in ["not json", r#"{"op":"teleport"}"#, r#"{"op":"list_tables"}"#] {
        let resp = client.send_raw(line).await;
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["kind"], "validation");
    }

    let resp = client
        .call(json!({ "op": "list_tables", "admin_id": Ulid::new().to_string() }))
        .await;
    assert_eq!(resp["kind"], "not_found");

    let (admin, _) = setup(&mut client).await;
    let tables = client.ok(json!({ "op": "list_tables", "admin_id": admin })).await;
    let labels: Vec<&str> = tables
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["A", "B"]);
}

#[tokio::test]
async fn clients_share_one_book() {
    let addr = start_test_server().await;
    let mut admin_client = Client::connect(addr).await;
    let (_, restaurant_id) = setup(&mut admin_client).await;

    let mut a = Client::connect(addr).await;
    let mut b = Client::connect(addr).await;
    let request = |customer: &str| {
        json!({
            "op": "create_reservation", "customer_id": customer,
            "restaurant_id": restaurant_id, "date": date(2),
            "start_time": "12:00", "guest_count": 6
        })
    };

    let first = a.call(request(&Ulid::new().to_string())).await;
    let second = b.call(request(&Ulid::new().to_string())).await;
    assert_eq!(first["ok"], true);
    assert_eq!(second["ok"], false);
    assert_eq!(second["kind"], "conflict");
}

#[tokio::test]
async fn customers_find_restaurants_before_booking() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let (admin, restaurant_id) = setup(&mut client).await;

    let listed = client.ok(json!({ "op": "list_restaurants" })).await;
    assert_eq!(listed[0]["id"], restaurant_id.as_str());
    assert_eq!(listed[0]["name"], "Wire Bistro");
    assert_eq!(listed[0]["active_tables"], 2);

    let detail = client
        .ok(json!({ "op": "get_restaurant", "restaurant_id": restaurant_id }))
        .await;
    assert_eq!(detail["tables"][0]["label"], "A");
    assert_eq!(detail["tables"][1]["capacity"], 4);

    let customer = Ulid::new().to_string();
    client
        .ok(json!({
            "op": "create_reservation", "customer_id": customer,
            "restaurant_id": detail["id"], "date": date(1),
            "start_time": "18:30", "guest_count": 2
        }))
        .await;

    let renamed = client
        .ok(json!({ "op": "update_restaurant", "admin_id": admin, "name": "Wire Brasserie" }))
        .await;
    assert_eq!(renamed["name"], "Wire Brasserie");
    assert_eq!(renamed["grid_rows"], 4);

    let mine = client.ok(json!({ "op": "get_my_restaurant", "admin_id": admin })).await;
    assert_eq!(mine["name"], "Wire Brasserie");
    assert_eq!(mine["tables"].as_array().unwrap().len(), 2);

    let customers = client.ok(json!({ "op": "admin_list_customers", "admin_id": admin })).await;
    assert_eq!(customers[0]["customer_id"], customer.as_str());
    assert_eq!(customers[0]["reservations"], 1);
    assert_eq!(customers[0]["active"], 1);

    let kind = client
        .err(json!({ "op": "get_restaurant", "restaurant_id": Ulid::new().to_string() }))
        .await;
    assert_eq!(kind, "not_found");
}
