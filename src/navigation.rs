use tokio::sync::watch;

/// Screens the put-away workflow can send the operator to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Route {
    #[strum(to_string = "/login")]
    Login,
    #[strum(to_string = "/putaway")]
    PutAway,
    #[strum(to_string = "/inventory")]
    InventoryList,
}

/// Current route, observable by whatever renders the workflow.
#[derive(Debug)]
pub struct Navigator {
    current: watch::Sender<Route>,
}

impl Navigator {
    pub fn new(start: Route) -> Self {
        let (current, _) = watch::channel(start);
        Self { current }
    }

    pub fn current(&self) -> Route {
        *self.current.borrow()
    }

    pub fn navigate(&self, route: Route) {
        self.current.send_replace(route);
    }

    /// Sends the operator to the login screen unless already there.
    /// Returns whether a redirect happened.
    pub fn redirect_to_login(&self) -> bool {
        self.current.send_if_modified(|route| {
            if *route == Route::Login {
                false
            } else {
                *route = Route::Login;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.current.subscribe()
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Route::PutAway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_redirect_happens_once() {
        let navigator = Navigator::default();
        let rx = navigator.subscribe();

        assert!(navigator.redirect_to_login());
        assert!(!navigator.redirect_to_login());
        assert_eq!(*rx.borrow(), Route::Login);
        assert_eq!(Route::InventoryList.to_string(), "/inventory");
    }
}
