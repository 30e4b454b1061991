//! A minimal example `Doer` wrapping a transport connection. Transport
//! plumbing itself is out of scope; this module exists only to show what
//! adapting an external resource to the `Doer` lifecycle looks like, the
//! way `ClientDoer` wraps a TCP client over `reopen`/`service`/`close`.

use crate::doer::Doer;
use crate::tyme::Tymth;

/// The surface `TcpClientDoer` needs from a connection: open it, service
/// pending I/O once, close it. Left minimal and synchronous on purpose —
/// a real transport would plug its own client type in here.
pub trait TcpClient {
    fn reopen(&mut self);
    fn service(&mut self);
    fn close(&mut self);
    fn wind(&mut self, tymth: Tymth);
}

pub struct TcpClientDoer<C: TcpClient> {
    client: C,
}

impl<C: TcpClient> TcpClientDoer<C> {
    pub fn new(client: C) -> Self {
        TcpClientDoer { client }
    }
}

impl<C: TcpClient> Doer for TcpClientDoer<C> {
    fn enter(&mut self) {
        self.client.reopen();
    }

    fn recur(&mut self, _tyme: f64) -> bool {
        self.client.service();
        true
    }

    fn exit(&mut self) {
        self.client.close();
    }

    fn wind(&mut self, tymth: Tymth) {
        self.client.wind(tymth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    struct FakeClient {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl TcpClient for FakeClient {
        fn reopen(&mut self) {
            self.log.borrow_mut().push("reopen");
        }
        fn service(&mut self) {
            self.log.borrow_mut().push("service");
        }
        fn close(&mut self) {
            self.log.borrow_mut().push("close");
        }
        fn wind(&mut self, _tymth: Tymth) {}
    }

    #[test]
    fn wraps_client_lifecycle() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut doer = TcpClientDoer::new(FakeClient { log: Rc::clone(&log) });
        doer.enter();
        doer.recur(0.0);
        doer.exit();
        assert_eq!(*log.borrow(), vec!["reopen", "service", "close"]);
    }
}
