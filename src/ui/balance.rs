use std::rc::Rc;

use gtk4 as gtk;
use gtk4::prelude::*;

use crate::api::models::Usage;
use crate::ui::Shell;

/// Credit balance in the header bar.
pub struct CreditBalance {
    root: gtk::Box,
    amount: gtk::Label,
    bar: gtk::LevelBar,
    shell: Rc<Shell>,
}

impl CreditBalance {
    pub fn new(shell: Rc<Shell>) -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 2);
        root.set_valign(gtk::Align::Center);

        let amount = gtk::Label::new(Some("Loading balance..."));
        amount.add_css_class("caption-heading");
        root.append(&amount);

        let bar = gtk::LevelBar::for_interval(0.0, 1.0);
        bar.set_size_request(96, 4);
        root.append(&bar);

        Rc::new(Self { root, amount, bar, shell })
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn refresh(self: &Rc<Self>) {
        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(async move { client.usage().await }, move |res| match res {
            Ok(usage) => this.show(&usage),
            Err(e) => {
                this.amount.set_label("Failed to load balance");
                this.shell.report("Failed to load balance", &e);
            }
        });
    }

    fn show(&self, usage: &Usage) {
        self.amount.set_label(&format!("{} credits", usage.credits_available));
        self.bar.set_value(usage.fill_fraction());
        let mut tooltip = format!(
            "Available: {}\nUsed: {}\nTotal purchased: {}",
            usage.credits_available, usage.credits_used, usage.total_credits_purchased
        );
        if usage.is_low() {
            self.amount.add_css_class("warning");
            tooltip = format!("Low balance! Purchase more credits to continue chatting.\n\n{tooltip}");
        } else {
            self.amount.remove_css_class("warning");
        }
        self.root.set_tooltip_text(Some(&tooltip));
    }
}
