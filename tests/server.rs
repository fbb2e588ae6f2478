use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use market::model::{AccountType, ProductDraft, ProductStatus, ProfileUpdate};
use market::{
    MarketClient, MarketError, MarketServer, NaiveThreadPool, RayonThreadPool, Response,
    SharedQueueThreadPool, Store, ThreadPool,
};

fn start_with<P: ThreadPool + Send + 'static>(server: MarketServer<P>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || server.serve(listener));
    addr
}

fn start() -> (SocketAddr, Store) {
    let store = Store::in_memory().unwrap();
    let pool = SharedQueueThreadPool::new(4).unwrap();
    (start_with(MarketServer::new(store.clone(), pool)), store)
}

fn profile() -> ProfileUpdate {
    ProfileUpdate {
        email: "a@b.com".to_owned(),
        phone: "09123456789".to_owned(),
        address: "Addr".to_owned(),
    }
}

fn widget(price: f64, stock: u32) -> ProductDraft {
    ProductDraft {
        name: "Widget".to_owned(),
        description: "desc".to_owned(),
        category: "Electronics".to_owned(),
        price,
        stock,
        seller: "admin".to_owned(),
        image: None,
    }
}

/// lists `draft` as admin, approves it and returns its id
fn list_and_approve(client: &mut MarketClient, draft: ProductDraft) -> u64 {
    client.add_product(draft).unwrap();
    let id = client.pending_products().unwrap().last().unwrap().id;
    client.approve(id).unwrap();
    id
}

#[test]
fn signup_then_login() {
    let (addr, _) = start();
    let mut client = MarketClient::connect(addr).unwrap();
    client
        .signup("alice", "Passw0rd", profile(), AccountType::Customer)
        .unwrap();
    let info = client.login("alice", "Passw0rd").unwrap();
    assert_eq!(info.username, "alice");
    assert_eq!(info.wallet, 0.0);
    assert_eq!(info.account_type, AccountType::Customer);
    assert_eq!(
        client.raw("LOGIN alice Passw0rd").unwrap(),
        Response::ok_with("LOGIN", "alice|0|Customer")
    );
}

#[test]
fn bad_credentials_are_indistinguishable() {
    let (addr, _) = start();
    let mut client = MarketClient::connect(addr).unwrap();
    let unknown = client.raw("LOGIN mallory Passw0rd").unwrap();
    let wrong = client.raw("LOGIN admin Passw0rd").unwrap();
    assert_eq!(unknown, Response::error("Invalid username or password"));
    assert_eq!(unknown, wrong);
}

#[test]
fn approved_products_are_listed() {
    let (addr, _) = start();
    let mut client = MarketClient::connect(addr).unwrap();
    let id = list_and_approve(&mut client, widget(19.99, 5));

    let approved = client.approved_products().unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, id);
    assert_eq!(approved[0].status, ProductStatus::Approved);
    assert_eq!(approved[0].stock, 5);
    assert_eq!(approved[0].price, 19.99);
    assert!(client.pending_products().unwrap().is_empty());

    let detail = client.product(id).unwrap();
    assert_eq!(detail.description, "desc");
    assert_eq!(detail.seller, "admin");
}

#[test]
fn checkout_over_the_wire() {
    let (addr, store) = start();
    let mut client = MarketClient::connect(addr).unwrap();
    client
        .signup("bob", "Passw0rd", profile(), AccountType::Customer)
        .unwrap();
    assert_eq!(client.deposit("bob", 100.0).unwrap(), 100.0);
    let id = list_and_approve(&mut client, widget(30.0, 5));

    client.add_to_cart("bob", id, 2).unwrap();
    let (lines, total) = client.cart("bob").unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 2);
    assert_eq!(total, 60.0);

    assert_eq!(client.checkout("bob").unwrap(), 60.0);
    assert_eq!(client.wallet("bob").unwrap(), 40.0);
    assert_eq!(client.wallet("admin").unwrap(), 10060.0);
    assert_eq!(store.get_product(id).unwrap().stock, 3);
    let history = client.history("bob").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].product_id, id);
    assert_eq!(history[0].total_price, 60.0);
    assert_eq!(client.cart("bob").unwrap(), (vec![], 0.0));
}

#[test]
fn rejecting_an_approved_product_fails() {
    let (addr, store) = start();
    let mut client = MarketClient::connect(addr).unwrap();
    let id = list_and_approve(&mut client, widget(19.99, 5));
    assert!(matches!(client.reject(id), Err(MarketError::Remote(_))));
    assert_eq!(store.get_product(id).unwrap().status, ProductStatus::Approved);
}

#[test]
fn malformed_commands_keep_the_connection_open() {
    let (addr, _) = start();
    let mut client = MarketClient::connect(addr).unwrap();
    for line in [
        "NOT_A_COMMAND",
        "LOGIN onlyone",
        "APPROVE seven",
        "ADD_TO_CART bob 1 many",
        "ADD_PRODUCT a|b",
        "DEPOSIT admin -4",
        "GET_CART nobody",
        "ADD_PRODUCT Dust|d|Misc|0.004|5|admin",
        "DEPOSIT admin 1e307",
        "DEPOSIT admin 0.001",
    ] {
        assert!(client.raw(line).unwrap().is_error(), "{}", line);
    }
    assert_eq!(client.wallet("admin").unwrap(), 10000.0);
    assert!(client.pending_products().unwrap().is_empty());
}

#[test]
fn pipelined_requests_are_answered_in_order() {
    let (addr, _) = start();
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(
            b"GET_WALLET admin\r\nGET_APPROVED_PRODUCTS\nBOGUS\nDEPOSIT admin 5\nGET_WALLET admin\n",
        )
        .unwrap();
    let mut reader = BufReader::new(stream);
    let responses: Vec<Response> = (0..5)
        .map(|_| Response::read_from(&mut reader).unwrap())
        .collect();
    assert_eq!(
        responses,
        vec![
            Response::ok_with("WALLET", 10000),
            Response::table("APPROVED_PRODUCTS", vec![]),
            Response::error("Unknown command: BOGUS"),
            Response::ok_with("DEPOSIT", 10005),
            Response::ok_with("WALLET", 10005),
        ]
    );
}

#[test]
fn a_request_split_across_writes() {
    let (addr, _) = start();
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_nodelay(true).unwrap();
    for piece in ["GET_WA", "LLET ", "adm", "in\n"] {
        stream.write_all(piece.as_bytes()).unwrap();
        stream.flush().unwrap();
        thread::sleep(std::time::Duration::from_millis(20));
    }
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).unwrap();
    assert_eq!(line, "OK WALLET 10000\n");
}

#[test]
fn overlong_lines_are_refused() {
    let store = Store::in_memory().unwrap();
    let server = MarketServer::new(store, NaiveThreadPool::new(1).unwrap()).with_max_line_len(64);
    let addr = start_with(server);

    let mut stream = TcpStream::connect(addr).unwrap();
    let mut line = vec![b'X'; 256];
    line.push(b'\n');
    stream.write_all(&line).unwrap();
    let mut answer = String::new();
    stream.read_to_string(&mut answer).unwrap();
    assert_eq!(answer, "ERROR line too long\n");
}

#[test]
fn many_clients_at_once() {
    let store = Store::in_memory().unwrap();
    let addr = start_with(MarketServer::new(store.clone(), RayonThreadPool::new(4).unwrap()));
    let id = {
        let mut admin = MarketClient::connect(addr).unwrap();
        list_and_approve(&mut admin, widget(2.0, 1_000))
    };

    let handles: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                let name = format!("user{}", i);
                let mut client = MarketClient::connect(addr).unwrap();
                client
                    .signup(&name, "Passw0rd", profile(), AccountType::Customer)
                    .unwrap();
                client.deposit(&name, 50.0).unwrap();
                for _ in 0..5 {
                    client.add_to_cart(&name, id, 1).unwrap();
                }
                assert_eq!(client.checkout(&name).unwrap(), 10.0);
                assert_eq!(client.wallet(&name).unwrap(), 40.0);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.get_product(id).unwrap().stock, 1_000 - 8 * 5);
    assert_eq!(store.wallet("admin").unwrap(), 10_000.0 + 8.0 * 10.0);
}

#[test]
fn logout_and_profile_updates() {
    let (addr, store) = start();
    let mut client = MarketClient::connect(addr).unwrap();
    client
        .signup("carol", "Passw0rd", profile(), AccountType::Customer)
        .unwrap();
    client.login("carol", "Passw0rd").unwrap();
    client
        .update_profile(
            "carol",
            ProfileUpdate {
                email: "carol@market.io".to_owned(),
                phone: "0999".to_owned(),
                address: "Long Road 12".to_owned(),
            },
        )
        .unwrap();
    client.logout().unwrap();
    assert_eq!(store.get_user("carol").unwrap().address(), "Long Road 12");
}
