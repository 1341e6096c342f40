use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{AuthResponse, ConsumerRegister, LoginRequest, ProducerRegister, RegisterRequest},
        cart::{AddToCartRequest, CartAvailability, CartCount, CartLine, CartView, UpdateCartItemRequest},
        categories::{
            CategoryList, CategoryNode, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest,
        },
        orders::{
            CancelOrderRequest, CheckoutResponse, OrderList, OrderWithItems, PaymentDirective,
            PlaceOrderRequest, TrackingResponse, TrackingStage, UpdateOrderStatusRequest,
        },
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
    },
    entity::{
        orders::{OrderStatus, PaymentMethod, PaymentStatus},
        products::ProductStatus,
        users::{UserRole, UserStatus},
    },
    error::{StockIssue, StockIssueKind, ValidationFailures},
    models::{Category, Order, OrderItem, Product, User},
    response::{ApiResponse, Meta},
    routes::{
        admin, auth, cart, categories, health, orders, params, products as product_routes,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        product_routes::list_products,
        product_routes::get_product,
        product_routes::create_product,
        product_routes::update_product,
        product_routes::delete_product,
        categories::list_categories,
        categories::category_tree,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        cart::view_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_cart_item,
        cart::clear_cart,
        cart::cart_count,
        cart::cart_availability,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        orders::confirm_delivery,
        orders::track_order,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
    ),
    components(
        schemas(
            User,
            UserRole,
            UserStatus,
            Product,
            ProductStatus,
            Category,
            Order,
            OrderItem,
            OrderStatus,
            PaymentMethod,
            PaymentStatus,
            RegisterRequest,
            ConsumerRegister,
            ProducerRegister,
            LoginRequest,
            AuthResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CategoryNode,
            CategoryTree,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartLine,
            CartView,
            CartCount,
            CartAvailability,
            PlaceOrderRequest,
            CancelOrderRequest,
            OrderList,
            OrderWithItems,
            PaymentDirective,
            CheckoutResponse,
            TrackingStage,
            TrackingResponse,
            UpdateOrderStatusRequest,
            StockIssue,
            StockIssueKind,
            ValidationFailures,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::AdminOrderQuery,
            params::CategoryQuery,
            params::LowStockQuery,
            health::HealthData,
            Meta,
            ApiResponse<User>,
            ApiResponse<AuthResponse>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Category>,
            ApiResponse<CategoryList>,
            ApiResponse<CategoryTree>,
            ApiResponse<CartView>,
            ApiResponse<CartCount>,
            ApiResponse<CartAvailability>,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<TrackingResponse>,
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and authentication"),
        (name = "Products", description = "Producer catalog"),
        (name = "Categories", description = "Catalog taxonomy"),
        (name = "Cart", description = "Shopping cart operations"),
        (name = "Orders", description = "Checkout, tracking, and order lifecycle"),
        (name = "Admin", description = "Back-office order and stock management"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
