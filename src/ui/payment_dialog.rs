use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use adw::prelude::*;
use gtk4 as gtk;

use crate::api::models::CreditShortfall;
use crate::api::stripe::{CardProcessor, StripeCardProcessor};
use crate::state::payment::{self, PaymentFlow, PurchaseError, Step};
use crate::ui::Shell;

/// Credit purchase wizard. `on_success` runs once credits were added.
pub fn show_payment_dialog<F: Fn() + 'static>(shell: &Rc<Shell>, shortfall: Option<CreditShortfall>, on_success: F) {
    let dialog = PaymentDialog::new(shell.clone(), shortfall, Rc::new(on_success));
    dialog.window.present();
    dialog.load();
}

struct PaymentDialog {
    window: adw::Window,
    stack: gtk::Stack,
    headline: gtk::Label,
    packages: gtk::ListBox,
    summary: gtk::Label,
    number: gtk::Entry,
    expiry: gtk::Entry,
    cvc: gtk::Entry,
    card_error: gtk::Label,
    pay_btn: gtk::Button,
    done: gtk::Label,
    flow: RefCell<PaymentFlow>,
    shell: Rc<Shell>,
    on_success: Rc<dyn Fn()>,
}

fn page(spacing: i32) -> gtk::Box {
    let b = gtk::Box::new(gtk::Orientation::Vertical, spacing);
    b.set_margin_top(18);
    b.set_margin_bottom(18);
    b.set_margin_start(18);
    b.set_margin_end(18);
    b
}

fn spinner_page(text: &str) -> gtk::Box {
    let b = page(12);
    b.set_valign(gtk::Align::Center);
    let spinner = gtk::Spinner::new();
    spinner.start();
    spinner.set_size_request(32, 32);
    b.append(&spinner);
    b.append(&gtk::Label::new(Some(text)));
    b
}

impl PaymentDialog {
    fn new(shell: Rc<Shell>, shortfall: Option<CreditShortfall>, on_success: Rc<dyn Fn()>) -> Rc<Self> {
        let window = adw::Window::builder()
            .title("Buy Credits")
            .transient_for(&shell.window)
            .modal(true)
            .default_width(420)
            .default_height(480)
            .build();

        let stack = gtk::Stack::new();
        stack.set_transition_type(gtk::StackTransitionType::SlideLeftRight);
        stack.add_named(&spinner_page("Loading packages..."), Some("loading"));

        let choose = page(12);
        let headline = gtk::Label::new(None);
        headline.add_css_class("title-4");
        headline.set_wrap(true);
        headline.set_halign(gtk::Align::Start);
        choose.append(&headline);
        let packages = gtk::ListBox::new();
        packages.add_css_class("boxed-list");
        packages.set_selection_mode(gtk::SelectionMode::None);
        choose.append(&packages);
        stack.add_named(&choose, Some("packages"));

        let card = page(8);
        let summary = gtk::Label::new(None);
        summary.add_css_class("title-4");
        summary.set_halign(gtk::Align::Start);
        card.append(&summary);
        let number = gtk::Entry::new();
        number.set_placeholder_text(Some("Card number"));
        number.set_input_purpose(gtk::InputPurpose::Digits);
        let row = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        let expiry = gtk::Entry::new();
        expiry.set_placeholder_text(Some("MM/YY"));
        expiry.set_hexpand(true);
        let cvc = gtk::Entry::new();
        cvc.set_placeholder_text(Some("CVC"));
        cvc.set_input_purpose(gtk::InputPurpose::Pin);
        cvc.set_visibility(false);
        cvc.set_hexpand(true);
        row.append(&expiry);
        row.append(&cvc);
        card.append(&number);
        card.append(&row);
        let card_error = gtk::Label::new(None);
        card_error.add_css_class("error");
        card_error.set_wrap(true);
        card_error.set_halign(gtk::Align::Start);
        card.append(&card_error);
        let buttons = gtk::Box::new(gtk::Orientation::Horizontal, 8);
        buttons.set_halign(gtk::Align::End);
        let back_btn = gtk::Button::with_label("Back");
        let pay_btn = gtk::Button::with_label("Pay");
        pay_btn.add_css_class("suggested-action");
        buttons.append(&back_btn);
        buttons.append(&pay_btn);
        card.append(&buttons);
        stack.add_named(&card, Some("card"));

        stack.add_named(&spinner_page("Processing payment..."), Some("processing"));

        let complete = page(12);
        complete.set_valign(gtk::Align::Center);
        let done = gtk::Label::new(None);
        done.add_css_class("title-3");
        done.set_wrap(true);
        complete.append(&done);
        let close_btn = gtk::Button::with_label("Continue chatting");
        close_btn.add_css_class("pill");
        close_btn.set_halign(gtk::Align::Center);
        complete.append(&close_btn);
        stack.add_named(&complete, Some("done"));

        let content = gtk::Box::new(gtk::Orientation::Vertical, 0);
        content.append(&adw::HeaderBar::new());
        content.append(&stack);
        window.set_content(Some(&content));

        let dialog = Rc::new(Self {
            window,
            stack,
            headline,
            packages,
            summary,
            number,
            expiry,
            cvc,
            card_error,
            pay_btn,
            done,
            flow: RefCell::new(PaymentFlow::new(shortfall)),
            shell,
            on_success,
        });

        {
            let this = dialog.clone();
            back_btn.connect_clicked(move |_| {
                this.flow.borrow_mut().back();
                this.render();
            });
        }
        {
            let this = dialog.clone();
            dialog.pay_btn.connect_clicked(move |_| this.pay());
        }
        {
            let this = dialog.clone();
            close_btn.connect_clicked(move |_| this.window.close());
        }

        dialog.render();
        dialog
    }

    fn load(self: &Rc<Self>) {
        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(async move { client.packages().await }, move |res| {
            let res = this.flow.borrow_mut().apply_packages(res);
            if let Err(e) = res {
                this.shell.report("Failed to load packages", &e);
            }
            this.fill_packages();
            this.render();
        });
    }

    fn fill_packages(self: &Rc<Self>) {
        while let Some(child) = self.packages.first_child() {
            self.packages.remove(&child);
        }
        let flow = self.flow.borrow();
        for (idx, package) in flow.packages().iter().enumerate() {
            let row = adw::ActionRow::builder()
                .title(format!("{} credits", package.credits))
                .subtitle(package.unit_price_label())
                .activatable(true)
                .build();
            if let Some(discount) = &package.discount {
                let tag = gtk::Label::new(Some(discount));
                tag.add_css_class("success");
                row.add_suffix(&tag);
            }
            if package.popular {
                let tag = gtk::Label::new(Some("Most popular"));
                tag.add_css_class("accent");
                row.add_suffix(&tag);
            }
            row.add_suffix(&gtk::Label::new(Some(&format!("£{:.2}", package.price_gbp))));

            let this = self.clone();
            row.connect_activated(move |_| {
                this.flow.borrow_mut().select(idx);
                this.render();
            });
            self.packages.append(&row);
        }
    }

    fn pay(self: &Rc<Self>) {
        let number = self.number.text();
        let expiry = self.expiry.text();
        let cvc = self.cvc.text();
        let order = self.flow.borrow_mut().begin_purchase(&number, &expiry, &cvc);
        self.render();
        let Some((package, card)) = order else {
            return;
        };

        let Some(key) = self.shell.stripe_key.clone() else {
            self.flow
                .borrow_mut()
                .finish_purchase(Err(PurchaseError::Declined("Card payments are not configured.".into())));
            self.render();
            return;
        };
        let processor: Arc<dyn CardProcessor> = Arc::new(StripeCardProcessor::new(key));

        let client = self.shell.client.clone();
        let this = self.clone();
        crate::utils::run_async_to_main(
            async move { payment::purchase(&client, processor.as_ref(), &package, &card).await },
            move |res| {
                if let Err(PurchaseError::Intent(e)) = &res {
                    if e.is_auth_failure() {
                        this.window.close();
                        this.shell.sign_out();
                        return;
                    }
                }
                if let Ok(confirmation) = &res {
                    this.shell.toast(&format!("Added {} credits", confirmation.credits_added));
                }
                this.flow.borrow_mut().finish_purchase(res);
                this.render();
                if this.flow.borrow().is_completed() {
                    (this.on_success)();
                }
            },
        );
    }

    fn render(&self) {
        let flow = self.flow.borrow();
        self.headline.set_label(&flow.headline());
        let name = match flow.step() {
            Step::Loading => "loading",
            Step::ChoosePackage => "packages",
            Step::EnterCard { package, error } => {
                self.summary.set_label(&format!("{} credits", package.credits));
                self.pay_btn.set_label(&package.pay_label());
                self.card_error.set_label(error.as_deref().unwrap_or_default());
                self.card_error.set_visible(error.is_some());
                "card"
            }
            Step::Processing { .. } => "processing",
            Step::Completed(confirmation) => {
                self.done.set_label(&format!(
                    "Added {} credits. Your balance is now {}.",
                    confirmation.credits_added, confirmation.new_balance
                ));
                "done"
            }
        };
        self.stack.set_visible_child_name(name);
    }
}
